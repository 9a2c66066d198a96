//! Search layer: domain validation and the progressive deep search engine

mod domain;
mod progressive;

pub use domain::{
    DomainBuilder, DomainError, build_multi_word_ilike_domain, validate_domain,
};
pub use progressive::{
    DeepSearchParams, DeepSearchResult, ModelSearchConfig, ProgressiveSearch, SearchLogEntry,
    search_config_for,
};
