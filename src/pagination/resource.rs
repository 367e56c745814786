//! Resource clients: get, search and cursor iteration
//!
//! A resource is one endpoint of an API (`/researchProducts`, `/projects`).
//! Implement [`Resource`] and opt into [`Gettable`], [`Searchable`] and
//! [`CursorIterable`] to get the standard operations, or use the generic
//! [`ResourceClient`].

use crate::error::{Error, Result};
use crate::http::{ApiClient, RequestOptions};
use crate::types::{params_from, JsonValue, Params};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Page size used by `search` when none is given
pub const DEFAULT_SEARCH_PAGE_SIZE: u32 = 20;

/// Page size used by `iterate` when none is given
pub const DEFAULT_ITERATE_PAGE_SIZE: u32 = 100;

// ============================================================================
// Items
// ============================================================================

/// An item parsed into `T`, or the raw JSON if it did not fit
#[derive(Debug, Clone, PartialEq)]
pub enum Item<T> {
    /// Parsed value
    Parsed(T),
    /// Raw JSON that failed to parse
    Raw(JsonValue),
}

impl<T: DeserializeOwned> Item<T> {
    /// Parse JSON into `T`, falling back to the raw value
    pub fn from_json(value: JsonValue) -> Self {
        match T::deserialize(&value) {
            Ok(parsed) => Item::Parsed(parsed),
            Err(e) => {
                warn!(
                    "Failed to parse item as {}: {e}. Returning raw data",
                    std::any::type_name::<T>()
                );
                Item::Raw(value)
            }
        }
    }
}

impl<T> Item<T> {
    /// Take the parsed value
    pub fn parsed(self) -> Option<T> {
        match self {
            Item::Parsed(value) => Some(value),
            Item::Raw(_) => None,
        }
    }

    /// Check if the item failed to parse
    pub fn is_raw(&self) -> bool {
        matches!(self, Item::Raw(_))
    }
}

impl<T: Serialize> Item<T> {
    /// Item as JSON, whichever form it is in
    pub fn to_json(&self) -> Result<JsonValue> {
        match self {
            Item::Parsed(value) => Ok(serde_json::to_value(value)?),
            Item::Raw(value) => Ok(value.clone()),
        }
    }
}

// ============================================================================
// Resource Definition
// ============================================================================

/// Endpoint path, sort fields and query parameter names of a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDefinition {
    /// Endpoint path relative to the base URL
    pub entity_path: String,
    /// Entity name used in messages
    pub entity_name: String,
    /// Allowed sort fields; `None` disables validation
    pub valid_sort_fields: Option<BTreeSet<String>>,
    pub id_param: String,
    pub page_param: String,
    pub page_size_param: String,
    pub sort_param: String,
    pub cursor_param: String,
    /// Cursor value that requests the first page
    pub start_cursor: String,
}

impl ResourceDefinition {
    /// Create a definition with the default parameter names
    pub fn new(entity_path: impl Into<String>, entity_name: impl Into<String>) -> Self {
        Self {
            entity_path: entity_path.into(),
            entity_name: entity_name.into(),
            valid_sort_fields: None,
            id_param: "id".to_string(),
            page_param: "page".to_string(),
            page_size_param: "pageSize".to_string(),
            sort_param: "sortBy".to_string(),
            cursor_param: "cursor".to_string(),
            start_cursor: "*".to_string(),
        }
    }

    /// Restrict sorting to the given fields
    #[must_use]
    pub fn with_sort_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_sort_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Rename the id parameter
    #[must_use]
    pub fn with_id_param(mut self, name: impl Into<String>) -> Self {
        self.id_param = name.into();
        self
    }

    /// Rename the page and page size parameters
    #[must_use]
    pub fn with_page_params(mut self, page: impl Into<String>, page_size: impl Into<String>) -> Self {
        self.page_param = page.into();
        self.page_size_param = page_size.into();
        self
    }

    /// Rename the sort parameter
    #[must_use]
    pub fn with_sort_param(mut self, name: impl Into<String>) -> Self {
        self.sort_param = name.into();
        self
    }

    /// Rename the cursor parameter and set the first-page sentinel
    #[must_use]
    pub fn with_cursor(mut self, param: impl Into<String>, start: impl Into<String>) -> Self {
        self.cursor_param = param.into();
        self.start_cursor = start.into();
        self
    }

    /// Check a sort expression such as `"title asc"` against the allowed fields
    pub fn validate_sort(&self, sort_by: &str) -> Result<()> {
        let Some(valid) = &self.valid_sort_fields else {
            return Ok(());
        };
        let field = sort_by.split_whitespace().next().unwrap_or_default();
        if valid.contains(field) {
            return Ok(());
        }
        let allowed: Vec<&str> = valid.iter().map(String::as_str).collect();
        Err(Error::validation(format!(
            "Invalid sort field '{field}' for {}. Valid fields: {}",
            self.entity_name,
            allowed.join(", ")
        )))
    }

    fn search_params(&self, query: &ListQuery) -> Result<Params> {
        let mut params = self.base_params(query, DEFAULT_SEARCH_PAGE_SIZE)?;
        params.insert(self.page_param.clone(), query.page.unwrap_or(1).into());
        Ok(params)
    }

    fn iterate_params(&self, query: &ListQuery) -> Result<Params> {
        let mut params = self.base_params(query, DEFAULT_ITERATE_PAGE_SIZE)?;
        params.remove(&self.page_param);
        Ok(params)
    }

    fn base_params(&self, query: &ListQuery, default_size: u32) -> Result<Params> {
        let mut params = query.filters.clone();
        if let Some(sort_by) = &query.sort_by {
            self.validate_sort(sort_by)?;
            params.insert(self.sort_param.clone(), sort_by.clone().into());
        }
        params.insert(
            self.page_size_param.clone(),
            query.page_size.unwrap_or(default_size).into(),
        );
        Ok(params)
    }
}

// ============================================================================
// List Query
// ============================================================================

/// Paging, sorting and filters for `search` and `iterate`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    /// Page number, 1-based (ignored by `iterate`)
    pub page: Option<u32>,
    /// Results per page
    pub page_size: Option<u32>,
    /// Sort expression, e.g. `"publicationDate desc"`
    pub sort_by: Option<String>,
    /// Filter parameters
    pub filters: Params,
}

impl ListQuery {
    /// Empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Set page number
    #[must_use]
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Set page size
    #[must_use]
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Set sort expression
    #[must_use]
    pub fn sort_by(mut self, sort_by: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self
    }

    /// Add one filter parameter
    #[must_use]
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Add filters from any serializable struct or map. `None` fields are skipped.
    pub fn filters<F: Serialize + ?Sized>(mut self, filters: &F) -> Result<Self> {
        self.filters.extend(params_from(filters)?);
        Ok(self)
    }
}

// ============================================================================
// Resource Traits
// ============================================================================

/// An API endpoint backed by an [`ApiClient`]
pub trait Resource: Send + Sync {
    /// Type of a single entity
    type Entity: DeserializeOwned + Send + Sync + 'static;
    /// Type of a full search response envelope
    type SearchResponse: DeserializeOwned + Send + Sync + 'static;

    /// Client used to send requests
    fn api(&self) -> &ApiClient;

    /// Endpoint definition
    fn definition(&self) -> &ResourceDefinition;
}

async fn fetch_page<R: Resource + ?Sized>(resource: &R, params: Params) -> Result<Arc<JsonValue>> {
    let definition = resource.definition();
    resource
        .api()
        .request_json(
            Method::GET,
            &definition.entity_path,
            RequestOptions::new().params(params),
        )
        .await
}

/// Fetch a single entity by id
#[async_trait]
pub trait Gettable: Resource {
    /// Fetch the entity with the given id.
    ///
    /// Issues a search filtered by id with a page size of one and fails with
    /// [`Error::NotFound`] if nothing matches.
    async fn get(&self, id: &str) -> Result<Item<Self::Entity>> {
        let definition = self.definition();
        info!("Fetching {} with ID: {id}", definition.entity_name);

        let mut params = Params::new();
        params.insert(definition.id_param.clone(), id.into());
        params.insert(definition.page_size_param.clone(), 1.into());

        let body = fetch_page(self, params).await?;
        let results = self.api().unwrapper().unwrap_results(&body)?;

        match results.into_iter().next() {
            Some(first) => Ok(Item::from_json(first)),
            None => Err(Error::not_found(format!(
                "{} with ID '{id}' not found.",
                definition.entity_name
            ))),
        }
    }
}

/// Page-number search
#[async_trait]
pub trait Searchable: Resource {
    /// Fetch one page of results.
    ///
    /// An invalid sort field fails before any request is sent.
    async fn search(&self, query: ListQuery) -> Result<Item<Self::SearchResponse>> {
        let definition = self.definition();
        let params = definition.search_params(&query)?;
        info!(
            "Searching {}: page={}, size={}, sort={:?}, filters={:?}",
            definition.entity_path,
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(DEFAULT_SEARCH_PAGE_SIZE),
            query.sort_by,
            query.filters
        );

        let body = fetch_page(self, params).await?;
        Ok(Item::from_json(body.as_ref().clone()))
    }

    /// Total number of results matching the query, as reported by the API
    async fn count(&self, query: ListQuery) -> Result<Option<u64>> {
        let definition = self.definition();
        let params = definition.search_params(&query.page(1).page_size(1))?;
        let body = fetch_page(self, params).await?;
        Ok(self.api().unwrapper().get_total_results(&body))
    }
}

struct CursorState {
    params: Params,
    cursor: Option<String>,
    buffer: VecDeque<JsonValue>,
}

/// Cursor-based iteration over every result
pub trait CursorIterable: Resource {
    /// Stream every entity matching the query, one page at a time.
    ///
    /// Iteration stops at an empty page or when the response carries no next
    /// cursor. An error ends the stream after it is yielded.
    fn iterate(&self, query: ListQuery) -> BoxStream<'_, Result<Item<Self::Entity>>> {
        let definition = self.definition();
        let params = match definition.iterate_params(&query) {
            Ok(params) => params,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        info!(
            "Iterating {}: pageSize={}, sort={:?}, filters={:?}",
            definition.entity_path,
            query.page_size.unwrap_or(DEFAULT_ITERATE_PAGE_SIZE),
            query.sort_by,
            query.filters
        );

        let state = CursorState {
            params,
            cursor: Some(definition.start_cursor.clone()),
            buffer: VecDeque::new(),
        };

        stream::unfold(state, move |mut state| async move {
            loop {
                if let Some(item) = state.buffer.pop_front() {
                    return Some((Ok(Item::from_json(item)), state));
                }

                let cursor = state.cursor.take()?;
                let definition = self.definition();
                let mut params = state.params.clone();
                params.insert(definition.cursor_param.clone(), cursor.into());
                debug!("Iterating {} with params: {params:?}", definition.entity_path);

                let page = match fetch_page(self, params).await {
                    Ok(body) => body,
                    Err(e) => return Some((Err(e), state)),
                };

                let unwrapper = self.api().unwrapper();
                let results = match unwrapper.unwrap_results(&page) {
                    Ok(results) => results,
                    Err(e) => return Some((Err(e), state)),
                };
                if results.is_empty() {
                    debug!("No more results for {}, stopping iteration", definition.entity_path);
                    return None;
                }

                state.cursor = unwrapper.get_next_page_token(&page);
                if state.cursor.is_none() {
                    debug!("No next cursor for {}, last page", definition.entity_path);
                }
                state.buffer.extend(results);
            }
        })
        .boxed()
    }
}

// ============================================================================
// Generic Resource Client
// ============================================================================

/// Ready-made resource with get, search and iterate.
///
/// `E` is the entity type and `S` the search envelope type; both default to
/// raw JSON.
pub struct ResourceClient<E = JsonValue, S = JsonValue> {
    api: Arc<ApiClient>,
    definition: ResourceDefinition,
    _marker: PhantomData<fn() -> (E, S)>,
}

impl<E, S> ResourceClient<E, S> {
    /// Create a resource client sharing the given API client
    pub fn new(api: Arc<ApiClient>, definition: ResourceDefinition) -> Self {
        Self {
            api,
            definition,
            _marker: PhantomData,
        }
    }
}

impl<E, S> Clone for ResourceClient<E, S> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.api), self.definition.clone())
    }
}

impl<E, S> std::fmt::Debug for ResourceClient<E, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceClient")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

impl<E, S> Resource for ResourceClient<E, S>
where
    E: DeserializeOwned + Send + Sync + 'static,
    S: DeserializeOwned + Send + Sync + 'static,
{
    type Entity = E;
    type SearchResponse = S;

    fn api(&self) -> &ApiClient {
        &self.api
    }

    fn definition(&self) -> &ResourceDefinition {
        &self.definition
    }
}

impl<E, S> Gettable for ResourceClient<E, S>
where
    E: DeserializeOwned + Send + Sync + 'static,
    S: DeserializeOwned + Send + Sync + 'static,
{
}

impl<E, S> Searchable for ResourceClient<E, S>
where
    E: DeserializeOwned + Send + Sync + 'static,
    S: DeserializeOwned + Send + Sync + 'static,
{
}

impl<E, S> CursorIterable for ResourceClient<E, S>
where
    E: DeserializeOwned + Send + Sync + 'static,
    S: DeserializeOwned + Send + Sync + 'static,
{
}
