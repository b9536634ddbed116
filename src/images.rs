// src/images.rs
//! Recipe pictures: accepted as base64 data URIs, kept as files under the
//! media root and served back from `/media/recipes/{file}`.
use crate::error::{ApiError, ApiResult};
use actix_web::{HttpResponse, get, http::header, web};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use std::io::ErrorKind;
use std::path::PathBuf;
use uuid::Uuid;

const RECIPE_DIR: &str = "recipes";

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_recipe_image);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "png" => Some(Self::Png),
            "jpg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    fn matches_signature(self, bytes: &[u8]) -> bool {
        match self {
            Self::Png => bytes.starts_with(b"\x89PNG\r\n\x1a\n"),
            Self::Jpeg => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
            Self::Gif => bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a"),
            Self::Webp => bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

fn invalid_image(message: &str) -> ApiError {
    ApiError::validation("invalid_image", message)
}

/// Decodes `data:image/<type>;base64,<data>`, checking that the bytes carry
/// the signature of the declared type.
pub fn decode_data_uri(uri: &str) -> ApiResult<DecodedImage> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| invalid_image("Image must be a data URI"))?;
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| invalid_image("Image must be a data URI"))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| invalid_image("Image must be base64 encoded"))?;
    let format = ImageFormat::from_mime(mime)
        .ok_or_else(|| invalid_image("Image must be PNG, JPEG, GIF or WebP"))?;
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|_| invalid_image("Image data is not valid base64"))?;

    if !format.matches_signature(&bytes) {
        return Err(invalid_image("Image data does not match its type"));
    }
    Ok(DecodedImage { format, bytes })
}

/// Image files on local disk, addressed by keys relative to `root`.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    base_url: String,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Writes the image under a fresh name and returns its key.
    pub async fn save_recipe_image(&self, image: &DecodedImage) -> ApiResult<String> {
        let key = format!("{RECIPE_DIR}/{}.{}", Uuid::new_v4(), image.format.extension());
        let path = self.root.join(&key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ApiError::Internal(format!("failed to create media directory: {e}")))?;
        }
        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to write image: {e}")))?;

        tracing::debug!(key = %key, bytes = image.bytes.len(), "Stored recipe image");
        Ok(key)
    }

    /// Removes a stored file. A missing file is not an error.
    pub async fn delete(&self, key: &str) {
        match tokio::fs::remove_file(self.root.join(key)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(key = %key, "Failed to delete image: {}", e),
        }
    }

    pub fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    async fn read_recipe_image(&self, file: &str) -> ApiResult<(ImageFormat, Vec<u8>)> {
        let not_found = || ApiError::not_found("Image");
        let (stem, ext) = file.rsplit_once('.').ok_or_else(not_found)?;
        let id = Uuid::parse_str(stem).map_err(|_| not_found())?;
        let format = ImageFormat::from_extension(ext).ok_or_else(not_found)?;

        let path = self.root.join(RECIPE_DIR).join(format!("{id}.{ext}"));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok((format, bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(ApiError::Internal(format!("failed to read image: {e}"))),
        }
    }
}

#[get("/media/recipes/{file}")]
pub async fn get_recipe_image(
    media: web::Data<MediaStore>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let (format, bytes) = media.read_recipe_image(&path).await?;
    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, format.mime()))
        .body(bytes))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test as actix_test};

    pub(crate) const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    pub(crate) fn png_data_uri() -> String {
        format!("data:image/png;base64,{}", BASE64.encode(PNG_BYTES))
    }

    pub(crate) fn temp_media() -> MediaStore {
        let root = std::env::temp_dir().join(format!("recipe-media-{}", Uuid::new_v4()));
        MediaStore::new(root, "/media/")
    }

    #[test]
    fn png_data_uri_decodes() {
        let image = decode_data_uri(&png_data_uri()).unwrap();
        assert_eq!(image.format, ImageFormat::Png);
        assert_eq!(image.bytes, PNG_BYTES);
    }

    #[test]
    fn malformed_payloads_are_invalid_images() {
        let jpeg_claiming_png = format!("data:image/jpeg;base64,{}", BASE64.encode(PNG_BYTES));
        for payload in [
            "iVBORw0KGgo=",
            "data:image/png,plain",
            "data:image/svg+xml;base64,PHN2Zz4=",
            "data:image/png;base64,***",
            jpeg_claiming_png.as_str(),
        ] {
            let err = decode_data_uri(payload).unwrap_err();
            assert_eq!(err.code(), "invalid_image", "{payload}");
        }
    }

    #[test]
    fn urls_join_base_and_key() {
        let media = temp_media();
        assert_eq!(media.url("recipes/a.png"), "/media/recipes/a.png");
    }

    #[actix_web::test]
    async fn stored_image_is_served_back_then_deleted() {
        let media = temp_media();
        let image = decode_data_uri(&png_data_uri()).unwrap();
        let key = media.save_recipe_image(&image).await.unwrap();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(media.clone()))
                .configure(init_routes),
        )
        .await;

        let req = actix_test::TestRequest::get().uri(&media.url(&key)).to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/png");
        assert_eq!(actix_test::read_body(resp).await, PNG_BYTES);

        media.delete(&key).await;
        let req = actix_test::TestRequest::get().uri(&media.url(&key)).to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn names_outside_the_store_are_not_found() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(temp_media()))
                .configure(init_routes),
        )
        .await;

        for uri in ["/media/recipes/secret.png", "/media/recipes/..%2F..%2Fetc%2Fpasswd"] {
            let req = actix_test::TestRequest::get().uri(uri).to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }
}
