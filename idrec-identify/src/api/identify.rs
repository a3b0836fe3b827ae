//! Identity endpoints
//!
//! - `POST /identify`: reconcile an observation
//! - `GET /identify/:id`: consolidated view of a contact's cluster
//! - `PUT /identify/:id`: raw field correction
//! - `DELETE /identify/:id`: soft delete

use axum::{
    async_trait,
    extract::{FromRequest, Path, Request, State},
    http::header,
    routing::{get, post},
    Form, Json, Router,
};
use idrec_common::Contact;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::identity::ConsolidatedContact;
use crate::AppState;

/// Body of `POST /identify` and `PUT /identify/:id`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactFieldsRequest {
    #[serde(default)]
    pub email: Option<String>,

    /// Clients send phone numbers as strings or bare JSON numbers
    #[serde(default, deserialize_with = "string_or_number")]
    pub phone_number: Option<String>,
}

/// Contact fields from a JSON or `application/x-www-form-urlencoded` body
#[derive(Debug)]
pub struct ContactFields(pub ContactFieldsRequest);

#[async_trait]
impl<S> FromRequest<S> for ContactFields
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|mime| mime.starts_with("application/x-www-form-urlencoded"));

        let request = if is_form {
            let Form(request) = Form::<ContactFieldsRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            request
        } else {
            let Json(request) = Json::<ContactFieldsRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            request
        };

        Ok(Self(request))
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "phoneNumber must be a string or number, got {}",
            other
        ))),
    }
}

#[derive(Debug, Serialize)]
pub struct ClusterResponse {
    pub contact: ConsolidatedContact,
}

#[derive(Debug, Serialize)]
pub struct ContactChangeResponse {
    pub message: String,
    pub contact: Contact,
}

/// POST /identify
pub async fn identify(
    State(state): State<AppState>,
    ContactFields(request): ContactFields,
) -> ApiResult<Json<ClusterResponse>> {
    debug!(?request, "Identify request");

    let contact = state
        .engine
        .reconcile(request.email.as_deref(), request.phone_number.as_deref())
        .await?;

    Ok(Json(ClusterResponse { contact }))
}

/// GET /identify/:id
pub async fn get_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ClusterResponse>> {
    let contact_id = parse_contact_id(&id)?;
    let contact = state.engine.get_cluster(contact_id).await?;

    Ok(Json(ClusterResponse { contact }))
}

/// PUT /identify/:id
pub async fn update_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ContactFields(request): ContactFields,
) -> ApiResult<Json<ContactChangeResponse>> {
    let contact_id = parse_contact_id(&id)?;

    let contact = state
        .engine
        .patch_fields(
            contact_id,
            request.email.as_deref(),
            request.phone_number.as_deref(),
        )
        .await?;

    Ok(Json(ContactChangeResponse {
        message: "Contact updated".to_string(),
        contact,
    }))
}

/// DELETE /identify/:id
pub async fn delete_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ContactChangeResponse>> {
    let contact_id = parse_contact_id(&id)?;
    let contact = state.engine.soft_delete(contact_id).await?;

    Ok(Json(ContactChangeResponse {
        message: "Contact soft deleted".to_string(),
        contact,
    }))
}

fn parse_contact_id(raw: &str) -> ApiResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("Invalid contact ID: {}", raw)))
}

/// Build identity routes
pub fn identify_routes() -> Router<AppState> {
    Router::new()
        .route("/identify", post(identify))
        .route(
            "/identify/:id",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
}
