use crate::application::Services;
use crate::application::reconciler::{GatewayOrderInfo, PaymentStatusView, VerifyResult};
use crate::application::refund::{ManualRefund, RefundReceipt};
use crate::application::webhook::WebhookAck;
use crate::domain::order::{Order, OrderStatus, Requester};
use crate::error::PaymentError;
use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_PHONE_HEADER: &str = "x-user-phone";
pub const ROLE_HEADER: &str = "x-role";
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Forbidden,
    NotFound(String),
    BadRequest { code: &'static str, message: String },
    Internal,
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            PaymentError::BadRequest(message) => ApiError::BadRequest {
                code: "bad_request",
                message,
            },
            PaymentError::ValidationError(message) => ApiError::BadRequest {
                code: "validation_error",
                message,
            },
            PaymentError::Gateway(detail) => {
                warn!(error = %detail, "payment gateway call failed");
                ApiError::BadRequest {
                    code: "gateway_error",
                    message: "payment provider rejected the request".to_string(),
                }
            }
            e @ (PaymentError::Storage(_) | PaymentError::InternalError(_)) => {
                error!(error = %e, "request failed");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "sign in or supply the guest e-mail used at checkout".to_string(),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "admin role required".to_string(),
            ),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            ApiError::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal server error".to_string(),
            ),
        };
        let mut resp = (status, Json(ErrorBody { code, message })).into_response();
        resp.headers_mut()
            .insert("X-Error-Code", HeaderValue::from_static(code));
        resp
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Signed-in user as asserted by the upstream auth layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

impl Session {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Some(Session {
            user_id: header(USER_ID_HEADER)?,
            email: header(USER_EMAIL_HEADER),
            phone: header(USER_PHONE_HEADER),
            role: header(ROLE_HEADER),
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("admin"))
    }

    fn into_requester(self) -> Requester {
        Requester::User {
            user_id: self.user_id,
            email: self.email,
            phone: self.phone,
        }
    }
}

/// A session if one was presented. Never rejects.
pub struct MaybeSession(pub Option<Session>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeSession(Session::from_headers(&parts.headers)))
    }
}

pub struct AdminSession(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_headers(&parts.headers).ok_or(ApiError::Unauthorized)?;
        if !session.is_admin() {
            return Err(ApiError::Forbidden);
        }
        Ok(AdminSession(session))
    }
}

fn requester(session: Option<Session>, guest_email: Option<String>) -> Result<Requester, ApiError> {
    match (session, guest_email.filter(|e| !e.trim().is_empty())) {
        (Some(session), _) => Ok(session.into_requester()),
        (None, Some(email)) => Ok(Requester::guest(email)),
        (None, None) => Err(ApiError::Unauthorized),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct GuestBody {
    #[serde(default)]
    pub guest_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
    #[serde(alias = "razorpay_order_id")]
    pub gateway_order_id: String,
    #[serde(alias = "razorpay_payment_id")]
    pub gateway_payment_id: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
    #[serde(default)]
    pub guest_email: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RefundBody {
    #[serde(default)]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: OrderStatus,
}

async fn create_payment(
    State(services): State<Services>,
    MaybeSession(session): MaybeSession,
    Path(order_id): Path<String>,
    body: Option<Json<GuestBody>>,
) -> ApiResult<GatewayOrderInfo> {
    let guest_email = body.and_then(|Json(b)| b.guest_email);
    let requester = requester(session, guest_email)?;
    let info = services
        .reconciler
        .create_payment_order(&requester, &order_id)
        .await?;
    Ok(Json(info))
}

async fn verify_payment(
    State(services): State<Services>,
    MaybeSession(session): MaybeSession,
    Path(order_id): Path<String>,
    Json(body): Json<VerifyBody>,
) -> ApiResult<VerifyResult> {
    let requester = requester(session, body.guest_email)?;
    let result = services
        .reconciler
        .verify_payment(
            &requester,
            &order_id,
            &body.gateway_order_id,
            &body.gateway_payment_id,
            &body.signature,
        )
        .await?;
    Ok(Json(result))
}

async fn payment_status(
    State(services): State<Services>,
    MaybeSession(session): MaybeSession,
    Path(order_id): Path<String>,
) -> ApiResult<PaymentStatusView> {
    let session = session.ok_or(ApiError::Unauthorized)?;
    let view = services
        .reconciler
        .payment_status(&session.into_requester(), &order_id)
        .await?;
    Ok(Json(view))
}

async fn gateway_webhook(
    State(services): State<Services>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let ack = services.webhooks.handle(&body, signature).await;
    let status = if ack.handled {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(ack))
}

async fn refund(
    State(services): State<Services>,
    AdminSession(_admin): AdminSession,
    Path(order_id): Path<String>,
    body: Option<Json<RefundBody>>,
) -> ApiResult<RefundReceipt> {
    let amount = body.and_then(|Json(b)| b.amount);
    let receipt = services.refunds.refund_payment(&order_id, amount).await?;
    Ok(Json(receipt))
}

async fn manual_refund(
    State(services): State<Services>,
    AdminSession(admin): AdminSession,
    Path(order_id): Path<String>,
    Json(body): Json<ManualRefund>,
) -> ApiResult<RefundReceipt> {
    tracing::info!(admin = %admin.user_id, order_id = %order_id, "manual refund requested");
    let receipt = services.refunds.manual_refund(&order_id, body).await?;
    Ok(Json(receipt))
}

async fn update_status(
    State(services): State<Services>,
    AdminSession(_admin): AdminSession,
    Path(order_id): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResult<Order> {
    let order = services
        .statuses
        .update_status(&order_id, body.status)
        .await?;
    Ok(Json(order))
}

async fn healthz() -> &'static str {
    "ok"
}

pub fn router(services: Services) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/orders/:id/payment",
            post(create_payment).get(payment_status),
        )
        .route("/orders/:id/payment/verify", post(verify_payment))
        .route("/webhooks/gateway", post(gateway_webhook))
        .route("/admin/orders/:id/refund", post(refund))
        .route("/admin/orders/:id/manual-refund", post(manual_refund))
        .route("/admin/orders/:id/status", put(update_status))
        .with_state(services)
}
