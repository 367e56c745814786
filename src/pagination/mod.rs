//! Pagination module
//!
//! Supports: single-entity lookup by id, page-number search, cursor iteration
//!
//! # Overview
//!
//! A [`ResponseUnwrapper`] knows how one API family shapes its JSON
//! envelopes. The [`Gettable`], [`Searchable`] and [`CursorIterable`] traits
//! build the standard operations on top of it and the
//! [`ApiClient`](crate::http::ApiClient), so an endpoint only has to supply
//! its path and types.

mod resource;
mod unwrapper;

pub use resource::{
    CursorIterable, Gettable, Item, ListQuery, Resource, ResourceClient, ResourceDefinition,
    Searchable, DEFAULT_ITERATE_PAGE_SIZE, DEFAULT_SEARCH_PAGE_SIZE,
};
pub use unwrapper::{lookup, PathUnwrapper, ResponseUnwrapper};
