// Resource handlers: JSON document CRUD shared by every collection
use actix_web::{web, HttpResponse, Scope};
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::app::AppContext;
use crate::error::{AppError, AppResult};
use crate::models::{AuthenticatedUser, Document};
use crate::utils::responses::ResponseBuilder;

/// Fields owned by the server; ignored when sent by clients
const RESERVED_FIELDS: [&str; 5] = ["id", "collection", "owner", "created_at", "updated_at"];

/// Collection served by a resource scope
pub struct Collection(pub &'static str);

/// Document as clients see it: metadata plus the body fields at the top level
#[derive(Serialize)]
pub struct DocumentView<'a> {
    pub id: Uuid,
    pub owner: &'a str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: &'a Map<String, Value>,
}

impl<'a> From<&'a Document> for DocumentView<'a> {
    fn from(document: &'a Document) -> Self {
        Self {
            id: document.id,
            owner: &document.owner,
            created_at: document.created_at,
            updated_at: document.updated_at,
            body: &document.body,
        }
    }
}

/// Routes for one collection mounted at `mount`
#[must_use]
pub fn scope(mount: &'static str, collection: &'static str) -> Scope {
    web::scope(mount)
        .app_data(web::Data::new(Collection(collection)))
        .route("", web::get().to(list))
        .route("", web::head().to(list))
        .route("", web::post().to(create))
        .route("/{id}", web::get().to(fetch))
        .route("/{id}", web::head().to(fetch))
        .route("/{id}", web::put().to(replace))
        .route("/{id}", web::patch().to(update))
        .route("/{id}", web::delete().to(remove))
}

/// Parse a request body that must be a JSON object
///
/// # Errors
///
/// Returns `AppError::InvalidRequest` for anything but a JSON object
pub fn parse_body(raw: &[u8]) -> AppResult<Map<String, Value>> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| AppError::InvalidRequest(format!("Body is not valid JSON: {e}")))?;
    match value {
        Value::Object(mut fields) => {
            for reserved in RESERVED_FIELDS {
                fields.remove(reserved);
            }
            Ok(fields)
        }
        _ => Err(AppError::InvalidRequest(
            "Body must be a JSON object".to_string(),
        )),
    }
}

fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(format!("document {raw}")))
}

async fn load(ctx: &AppContext, collection: &str, raw_id: &str) -> AppResult<Document> {
    let id = parse_id(raw_id)?;
    ctx.stores
        .documents
        .get(collection, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{collection}/{id}")))
}

/// `GET {mount}`
///
/// # Errors
///
/// Returns `AppError::DatabaseUnavailable` if the store read fails
pub async fn list(
    collection: web::Data<Collection>,
    ctx: web::Data<AppContext>,
) -> AppResult<HttpResponse> {
    let documents = ctx.stores.documents.list(collection.0).await?;
    let views: Vec<DocumentView<'_>> = documents.iter().map(DocumentView::from).collect();
    Ok(ResponseBuilder::ok(&views))
}

/// `POST {mount}` - the creator becomes the owner
///
/// # Errors
///
/// Returns `AppError::InvalidRequest` for non-object bodies
pub async fn create(
    user: AuthenticatedUser,
    collection: web::Data<Collection>,
    ctx: web::Data<AppContext>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let fields = parse_body(&body)?;
    let document = Document::new(collection.0, &user.identity().provider_id, fields);
    ctx.stores.documents.save(&document).await?;

    info!("Created {}/{}", collection.0, document.id);
    Ok(ResponseBuilder::created(&DocumentView::from(&document)))
}

/// `GET {mount}/{id}`
///
/// # Errors
///
/// Returns `AppError::NotFound` for unknown ids
pub async fn fetch(
    path: web::Path<String>,
    collection: web::Data<Collection>,
    ctx: web::Data<AppContext>,
) -> AppResult<HttpResponse> {
    let document = load(&ctx, collection.0, &path).await?;
    Ok(ResponseBuilder::ok(&DocumentView::from(&document)))
}

/// `PUT {mount}/{id}` - replace the whole body
///
/// # Errors
///
/// Returns `AppError::NotFound` for unknown ids and `AppError::InvalidRequest`
/// for non-object bodies
pub async fn replace(
    _user: AuthenticatedUser,
    path: web::Path<String>,
    collection: web::Data<Collection>,
    ctx: web::Data<AppContext>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let fields = parse_body(&body)?;
    let mut document = load(&ctx, collection.0, &path).await?;
    document.body = fields;
    document.updated_at = Utc::now();
    ctx.stores.documents.save(&document).await?;
    Ok(ResponseBuilder::ok(&DocumentView::from(&document)))
}

/// `PATCH {mount}/{id}` - merge top-level fields; `null` removes a field
///
/// # Errors
///
/// Returns `AppError::NotFound` for unknown ids and `AppError::InvalidRequest`
/// for non-object bodies
pub async fn update(
    _user: AuthenticatedUser,
    path: web::Path<String>,
    collection: web::Data<Collection>,
    ctx: web::Data<AppContext>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let fields = parse_body(&body)?;
    let mut document = load(&ctx, collection.0, &path).await?;
    merge_fields(&mut document.body, fields);
    document.updated_at = Utc::now();
    ctx.stores.documents.save(&document).await?;
    Ok(ResponseBuilder::ok(&DocumentView::from(&document)))
}

/// `DELETE {mount}/{id}`
///
/// # Errors
///
/// Returns `AppError::NotFound` for unknown ids
pub async fn remove(
    _user: AuthenticatedUser,
    path: web::Path<String>,
    collection: web::Data<Collection>,
    ctx: web::Data<AppContext>,
) -> AppResult<HttpResponse> {
    let id = parse_id(&path)?;
    if !ctx.stores.documents.delete(collection.0, id).await? {
        return Err(AppError::NotFound(format!("{}/{id}", collection.0)));
    }
    info!("Deleted {}/{id}", collection.0);
    Ok(ResponseBuilder::no_content())
}

fn merge_fields(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}
