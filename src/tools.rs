//! Declarative tool surface.
//!
//! Every catalog operation exposed to agents is one [`Tool`]: a name, a
//! description, a JSON Schema for its parameters, and an async handler.
//! All tools live in one [`ToolRegistry`], shared by the MCP stdio bridge
//! ([`crate::mcp`]) and the HTTP server ([`crate::server`]).
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ToolRegistry                 │
//! │  semantic_search   search_services   ...     │
//! └──────────────┬───────────────────────────────┘
//!                │ validate_params(schema, params)
//!                ▼
//!       Tool::execute(params, &ToolContext)
//!                │
//!                ▼
//!         CatalogService (lazy initialize)
//! ```
//!
//! Parameters are checked against the tool's schema by
//! [`validate_params`] before a handler sees them, so handlers can read
//! typed values without re-validating.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::catalog::CatalogService;
use crate::config::Config;
use crate::models::{MatchSpan, SearchQuery, ServiceLookup, ServiceRecord};

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A tool that agents can discover and call.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use freetier_catalog::tools::{Tool, ToolContext};
///
/// pub struct CountTool;
///
/// #[async_trait]
/// impl Tool for CountTool {
///     fn name(&self) -> &str { "count_services" }
///     fn description(&self) -> &str { "Count catalogued services" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {} })
///     }
///
///     async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
///         let catalog = ctx.catalog().await?;
///         Ok(json!({ "count": catalog.snapshot()?.services.len() }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores; also the HTTP route segment.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Whether the tool ships with the crate. Defaults to `false`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema object with `type: "object"`, `properties`, and
    /// optionally `required`.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` has already passed [`validate_params`].
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// Shared state handed to every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    catalog: Arc<CatalogService>,
    config: Arc<Config>,
}

impl ToolContext {
    pub fn new(catalog: Arc<CatalogService>, config: Arc<Config>) -> Self {
        Self { catalog, config }
    }

    /// The catalog, initialized on first use.
    pub async fn catalog(&self) -> Result<&CatalogService> {
        self.catalog.initialize().await?;
        Ok(&self.catalog)
    }

    /// The catalog as-is, without triggering initialization.
    pub fn service(&self) -> &CatalogService {
        &self.catalog
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn limit(&self, params: &Value, default: usize) -> usize {
        let limit = params["limit"]
            .as_u64()
            .map_or(default, |l| usize::try_from(l).unwrap_or(usize::MAX));
        self.config.search.clamp_limit(limit)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parameter Validation
// ═══════════════════════════════════════════════════════════════════════

/// Serializable tool info for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    /// JSON Schema for the parameters.
    pub parameters: Value,
}

impl ToolInfo {
    pub fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            builtin: tool.is_builtin(),
            parameters: tool.parameters_schema(),
        }
    }
}

/// Validate `params` against a tool's JSON Schema.
///
/// Checks required keys, JSON types (`string`, `integer`, `number`,
/// `boolean`, `array`, `object`), `enum` membership, and integer
/// `minimum`. Absent properties with a `default` get it injected. Unknown
/// keys pass through untouched.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => bail!("parameters must be a JSON object, got {}", json_type_name(other)),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<String> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    for req_field in &required {
        if !params_obj.contains_key(req_field) {
            bail!("missing required parameter: {}", req_field);
        }
    }

    let mut result = params_obj.clone();

    for (prop_name, prop_schema) in &properties {
        let Some(value) = params_obj.get(prop_name) else {
            if let Some(default) = prop_schema.get("default") {
                result.insert(prop_name.clone(), default.clone());
            }
            continue;
        };

        if let Some(expected_type) = prop_schema.get("type").and_then(|t| t.as_str()) {
            let type_ok = match expected_type {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !type_ok {
                bail!(
                    "parameter '{}' must be of type '{}', got {}",
                    prop_name,
                    expected_type,
                    json_type_name(value)
                );
            }
        }

        if let Some(enum_values) = prop_schema.get("enum").and_then(|e| e.as_array()) {
            if !enum_values.contains(value) {
                let allowed: Vec<String> = enum_values.iter().map(|v| v.to_string()).collect();
                bail!(
                    "parameter '{}' must be one of [{}], got {}",
                    prop_name,
                    allowed.join(", "),
                    value
                );
            }
        }

        if let (Some(minimum), Some(n)) = (
            prop_schema.get("minimum").and_then(|m| m.as_f64()),
            value.as_f64(),
        ) {
            if n < minimum {
                bail!(
                    "parameter '{}' must be >= {}, got {}",
                    prop_name,
                    minimum,
                    value
                );
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn str_param(params: &Value, key: &str) -> Option<String> {
    params[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn tags_param(params: &Value) -> Option<Vec<String>> {
    let tags: Vec<String> = params["tags"]
        .as_array()?
        .iter()
        .filter_map(|t| t.as_str())
        .map(str::to_string)
        .collect();
    (!tags.is_empty()).then_some(tags)
}

fn search_query(params: &Value, ctx: &ToolContext) -> SearchQuery {
    SearchQuery {
        query: str_param(params, "query"),
        category: str_param(params, "category"),
        tags: tags_param(params),
        limit: ctx.limit(params, ctx.config.search.default_limit),
    }
}

fn filter_schema(extra_query_doc: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": extra_query_doc },
            "category": { "type": "string", "description": "Filter by category (substring, case-insensitive)" },
            "tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Keep services carrying any of these tags"
            },
            "limit": { "type": "integer", "minimum": 1, "default": 10, "description": "Max results" }
        }
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tools
// ═══════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RankedService<'a> {
    #[serde(flatten)]
    record: &'a ServiceRecord,
    relevance_score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    matches: Option<&'a [MatchSpan]>,
}

/// Fuzzy, ranked search over the catalog.
pub struct SemanticSearchTool;

#[async_trait]
impl Tool for SemanticSearchTool {
    fn name(&self) -> &str {
        "semantic_search"
    }

    fn description(&self) -> &str {
        "Fuzzy search for free-tier services, tolerant of typos, ranked by relevance"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        let mut schema = filter_schema("Free-text query, e.g. \"postgres database\"");
        schema["required"] = json!(["query"]);
        schema
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = search_query(&params, ctx);
        if query.trimmed_query().is_none() {
            bail!("query must not be empty");
        }

        let results = ctx.catalog().await?.search(&query)?;
        let ranked: Vec<RankedService> = results
            .iter()
            .map(|r| RankedService {
                record: &r.record,
                relevance_score: ((1.0 - r.score) * 100.0).round() as i64,
                matches: r.match_spans.as_deref(),
            })
            .collect();

        Ok(json!({
            "query": query.query,
            "totalResults": ranked.len(),
            "results": ranked,
        }))
    }
}

/// Plain substring search in document order.
pub struct SearchServicesTool;

#[async_trait]
impl Tool for SearchServicesTool {
    fn name(&self) -> &str {
        "search_services"
    }

    fn description(&self) -> &str {
        "Search services by substring, category, and tags, in catalog order"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        filter_schema("Substring to look for in name, description, free tier, or category")
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = search_query(&params, ctx);
        let services = ctx.catalog().await?.basic_search(&query)?;
        Ok(json!({ "totalResults": services.len(), "services": services }))
    }
}

pub struct SimilarServicesTool;

#[async_trait]
impl Tool for SimilarServicesTool {
    fn name(&self) -> &str {
        "get_similar_services"
    }

    fn description(&self) -> &str {
        "Find services similar to a named service by category and shared tags"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "serviceName": { "type": "string", "description": "Exact service name (case-insensitive)" },
                "limit": { "type": "integer", "minimum": 1, "default": 5, "description": "Max results" }
            },
            "required": ["serviceName"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let Some(name) = str_param(&params, "serviceName") else {
            bail!("serviceName must not be empty");
        };
        let limit = ctx.limit(&params, 5);

        match ctx.catalog().await?.similar(&name, limit)? {
            Some(similar) => Ok(json!({
                "service": name,
                "totalResults": similar.len(),
                "similarServices": similar,
            })),
            None => bail!("service not found: {}", name),
        }
    }
}

pub struct PopularServicesTool;

#[async_trait]
impl Tool for PopularServicesTool {
    fn name(&self) -> &str {
        "get_popular_services"
    }

    fn description(&self) -> &str {
        "List services ranked by a popularity heuristic"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "minimum": 1, "default": 10, "description": "Max results" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let limit = ctx.limit(&params, ctx.config.search.default_limit);
        let services = ctx.catalog().await?.popular(limit)?;
        Ok(json!({ "totalResults": services.len(), "services": services }))
    }
}

pub struct ListCategoriesTool;

#[async_trait]
impl Tool for ListCategoriesTool {
    fn name(&self) -> &str {
        "list_categories"
    }

    fn description(&self) -> &str {
        "List all service categories, optionally with service counts"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "withCount": { "type": "boolean", "default": false, "description": "Include service counts" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let catalog = ctx.catalog().await?;
        if params["withCount"].as_bool().unwrap_or(false) {
            let categories = catalog.categories_with_count()?;
            Ok(json!({ "total": categories.len(), "categories": categories }))
        } else {
            let categories = catalog.categories()?;
            Ok(json!({ "total": categories.len(), "categories": categories }))
        }
    }
}

pub struct GetServiceTool;

#[async_trait]
impl Tool for GetServiceTool {
    fn name(&self) -> &str {
        "get_service"
    }

    fn description(&self) -> &str {
        "Get one service by exact URL or by name"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Service name (case-insensitive)" },
                "url": { "type": "string", "description": "Service URL (exact)" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let lookup = ServiceLookup {
            name: str_param(&params, "name"),
            url: str_param(&params, "url"),
        };
        if lookup.name.is_none() && lookup.url.is_none() {
            bail!("invalid parameters: either name or url must be provided");
        }

        match ctx.catalog().await?.get_service(&lookup)? {
            Some(service) => Ok(serde_json::to_value(service)?),
            None => bail!(
                "service not found: {}",
                lookup.url.or(lookup.name).unwrap_or_default()
            ),
        }
    }
}

pub struct ListTagsTool;

#[async_trait]
impl Tool for ListTagsTool {
    fn name(&self) -> &str {
        "list_tags"
    }

    fn description(&self) -> &str {
        "List every tag in use, sorted"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let tags = ctx.catalog().await?.all_tags()?;
        Ok(json!({ "total": tags.len(), "tags": tags }))
    }
}

pub struct StatsTool;

#[async_trait]
impl Tool for StatsTool {
    fn name(&self) -> &str {
        "get_stats"
    }

    fn description(&self) -> &str {
        "Catalog, search index, and cache statistics"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let stats = ctx.catalog().await?.stats();
        Ok(serde_json::to_value(stats)?)
    }
}

pub struct RefreshTool;

#[async_trait]
impl Tool for RefreshTool {
    fn name(&self) -> &str {
        "refresh_data"
    }

    fn description(&self) -> &str {
        "Re-download and re-parse the catalog, replacing cached data"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let summary = ctx.service().refresh().await?;
        Ok(serde_json::to_value(summary)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Ordered collection of tools.
///
/// ```rust
/// use freetier_catalog::tools::ToolRegistry;
///
/// let tools = ToolRegistry::with_builtins();
/// assert!(tools.find("semantic_search").is_some());
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry holding every catalog tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SemanticSearchTool));
        registry.register(Box::new(SearchServicesTool));
        registry.register(Box::new(SimilarServicesTool));
        registry.register(Box::new(PopularServicesTool));
        registry.register(Box::new(ListCategoriesTool));
        registry.register(Box::new(GetServiceTool));
        registry.register(Box::new(ListTagsTool));
        registry.register(Box::new(StatsTool));
        registry.register(Box::new(RefreshTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools.iter().map(|t| ToolInfo::from_tool(t.as_ref())).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
