//! OpenAPI document describing the server.

use utoipa::openapi::server::Server;
use utoipa::openapi::OpenApi;

use crate::chain::ChainInput;
use crate::config::AppMetadata;
use crate::llm::{ChatMessage, Role};

use super::error::ErrorBody;
use super::handlers;

#[derive(utoipa::OpenApi)]
#[openapi(
    paths(handlers::healthz, handlers::root, handlers::metrics),
    components(schemas(ChainInput, ChatMessage, Role, ErrorBody)),
    tags(
        (name = "health", description = "Liveness and navigation"),
        (name = "telemetry", description = "Process metrics")
    )
)]
struct ApiDoc;

/// Build the OpenAPI document.
///
/// Metadata always comes from [`AppMetadata::CURRENT`]. A non-empty
/// `proxy_prefix` is advertised as the root path of the only server.
pub fn document(proxy_prefix: &str) -> OpenApi {
    let metadata = AppMetadata::CURRENT;
    let mut doc = <ApiDoc as utoipa::OpenApi>::openapi();

    doc.info.title = metadata.title.to_string();
    doc.info.version = metadata.version.to_string();
    doc.info.description = Some(metadata.description.to_string());

    if !proxy_prefix.is_empty() {
        doc.servers = Some(vec![Server::new(proxy_prefix)]);
    }

    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{APP_DESCRIPTION, APP_TITLE, APP_VERSION};

    #[test]
    fn document_carries_fixed_metadata() {
        for prefix in ["", "/api"] {
            let doc = document(prefix);
            assert_eq!(doc.info.title, APP_TITLE);
            assert_eq!(doc.info.version, APP_VERSION);
            assert_eq!(doc.info.description.as_deref(), Some(APP_DESCRIPTION));
        }
    }

    #[test]
    fn prefix_becomes_server_url() {
        assert!(document("").servers.is_none());

        let servers = document("/api").servers.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].url, "/api");
    }

    #[test]
    fn document_lists_static_routes() {
        let doc = document("");
        assert!(doc.paths.paths.contains_key("/healthz"));
        assert!(doc.paths.paths.contains_key("/"));
    }
}
