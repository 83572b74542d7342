//! OpenAPI document, served at `/apispec_1.json` and browsable at `/swagger/`.

use crate::handlers::{FindFaceResponse, RemoveBackgroundResponse};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "facekit",
        description = "Face landmarks, face comparison and background removal over multipart uploads."
    ),
    paths(
        crate::handlers::find_face,
        crate::handlers::remove_background,
        crate::handlers::compare_face,
    ),
    components(schemas(FindFaceResponse, RemoveBackgroundResponse)),
    tags(
        (name = "faces", description = "Face detection and verification"),
        (name = "images", description = "Image editing")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_endpoint() {
        let doc = ApiDoc::openapi();
        for path in ["/find-face/", "/rm-bg/", "/comapre-face/"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
