use crate::extractors::RejectionType;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use log::*;
use semver::Version;
use service::config::ApiVersion;

/// Requires the `x-version` header to name one of the supported API versions.
pub(crate) struct CompareApiVersion(pub Version);

#[async_trait]
impl<S> FromRequestParts<S> for CompareApiVersion
where
    S: Send + Sync,
{
    type Rejection = RejectionType;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(ApiVersion::field_name())
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                (
                    StatusCode::BAD_REQUEST,
                    format!("Missing {} header", ApiVersion::field_name()),
                )
            })?;

        if !ApiVersion::versions().contains(&header) {
            warn!("Rejected request for unsupported API version {header}");
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Unsupported API version: {header}"),
            ));
        }

        Version::parse(header)
            .map(CompareApiVersion)
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
    }
}
