use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
#[schema(as = params::channel::CreateParams)]
pub(crate) struct CreateParams {
    /// 1 to 64 characters of `[a-z0-9_-]`.
    #[schema(example = "general")]
    pub(crate) id: String,
}

/// Cursor for paging backwards through a channel's messages.
#[derive(Debug, Deserialize, IntoParams)]
pub(crate) struct HistoryParams {
    /// Only return messages with a sequence lower than this one.
    pub(crate) before: Option<i64>,
    /// Page size, capped by the configured history page limit.
    pub(crate) limit: Option<u64>,
}
