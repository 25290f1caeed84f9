//! Signup, e-mail verification, password login and passwordless login links.
//!
//! Verification codes and login links are written to the log instead of being
//! mailed.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use woodhop_auth::{PrincipalId, Role, VerificationCode, generate_verification_code};
use woodhop_core::CustomerId;
use woodhop_infra::aggregate_types;
use woodhop_parties::{
    Customer, CustomerCommand, IssueVerificationCode, RegisterCustomer, VerifyAccount, normalize_email,
};

use crate::app::dto;
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

const TOKEN_LOGIN_ANSWER: &str = "If an account exists for this e-mail, a login link has been sent.";

pub fn public_router() -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/verify/:customer_id", post(verify))
        .route("/verify/:customer_id/resend", post(resend_code))
        .route("/login", post(login))
        .route("/token-login", post(request_login_link))
        .route("/token-login/:token", get(redeem_login_link))
}

fn load_customer(services: &AppServices, customer_id: CustomerId) -> Result<Customer, axum::response::Response> {
    let customer = services
        .load(customer_id.as_aggregate_id(), |id| Customer::empty(CustomerId::from(id)))
        .map_err(errors::dispatch_error_to_response)?;
    if customer.is_created() {
        Ok(customer)
    } else {
        Err(errors::not_found("customer"))
    }
}

fn dispatch_customer(services: &AppServices, customer_id: CustomerId, cmd: CustomerCommand) -> Result<(), axum::response::Response> {
    services
        .dispatch::<Customer>(customer_id.as_aggregate_id(), aggregate_types::CUSTOMER, cmd, |id| {
            Customer::empty(CustomerId::from(id))
        })
        .map(|_| ())
        .map_err(errors::dispatch_error_to_response)
}

fn issue_session(services: &AppServices, sub: PrincipalId, email: &str, roles: Vec<Role>) -> axum::response::Response {
    match services.tokens.issue_session(sub, email, roles, Utc::now()) {
        Ok((token, claims)) => Json(serde_json::json!({
            "token": token,
            "expires_at": claims.expires_at,
            "principal_id": claims.sub.to_string(),
            "roles": claims.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

fn customer_session(services: &AppServices, customer: &Customer) -> axum::response::Response {
    issue_session(
        services,
        PrincipalId::from(customer.id_typed()),
        customer.email(),
        vec![authz::role_for(customer.customer_type())],
    )
}

fn verification_required(customer_id: CustomerId) -> axum::response::Response {
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({
            "error": "verification_required",
            "message": "account is not verified; enter the code sent to your e-mail",
            "customer_id": customer_id.to_string(),
        })),
    )
        .into_response()
}

pub async fn signup(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SignupRequest>,
) -> axum::response::Response {
    let email = match normalize_email(&body.email) {
        Ok(e) => e,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_email", e.to_string()),
    };
    let customer_type = match dto::parse_customer_type(&body.customer_type) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    if body.password.is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_password", "password is required");
    }
    // Checked against the directory; the aggregate cannot see other accounts.
    if services.customers.find_by_email(&email).is_some() {
        return errors::json_error(StatusCode::CONFLICT, "email_taken", "an account with this e-mail already exists");
    }

    let password_hash = match services.passwords.hash(&body.password) {
        Ok(h) => h,
        Err(e) => return errors::auth_error_to_response(e),
    };
    let customer_id = CustomerId::new();
    let code = generate_verification_code();

    let cmd = CustomerCommand::RegisterCustomer(RegisterCustomer {
        customer_id,
        fullname: body.fullname,
        email: email.clone(),
        password_hash,
        customer_type,
        location: body.location,
        verification_code: code.as_str().to_string(),
        occurred_at: Utc::now(),
    });
    if let Err(resp) = dispatch_customer(&services, customer_id, cmd) {
        return resp;
    }
    tracing::info!(customer_id = %customer_id, email = %email, code = code.as_str(), "verification code issued");

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "customer_id": customer_id.to_string(),
            "verification_required": true,
        })),
    )
        .into_response()
}

pub async fn verify(
    Extension(services): Extension<Arc<AppServices>>,
    Path(customer_id): Path<String>,
    Json(body): Json<dto::VerifyRequest>,
) -> axum::response::Response {
    let customer_id = match errors::parse_id(&customer_id, "customer") {
        Ok(agg) => CustomerId::from(agg),
        Err(resp) => return resp,
    };
    let code = match body.code.as_deref() {
        Some(raw) => VerificationCode::parse(raw),
        None => VerificationCode::from_digits(body.digits()),
    };
    let code = match code {
        Ok(c) => c,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_code", e.to_string()),
    };

    let cmd = CustomerCommand::VerifyAccount(VerifyAccount {
        customer_id,
        code: code.as_str().to_string(),
        occurred_at: Utc::now(),
    });
    if let Err(resp) = dispatch_customer(&services, customer_id, cmd) {
        return resp;
    }
    tracing::info!(customer_id = %customer_id, "account verified");

    match load_customer(&services, customer_id) {
        Ok(customer) => customer_session(&services, &customer),
        Err(resp) => resp,
    }
}

pub async fn resend_code(
    Extension(services): Extension<Arc<AppServices>>,
    Path(customer_id): Path<String>,
) -> axum::response::Response {
    let customer_id = match errors::parse_id(&customer_id, "customer") {
        Ok(agg) => CustomerId::from(agg),
        Err(resp) => return resp,
    };
    let customer = match load_customer(&services, customer_id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if customer.is_verified() {
        return errors::json_error(StatusCode::CONFLICT, "already_verified", "account is already verified");
    }

    let code = generate_verification_code();
    let cmd = CustomerCommand::IssueVerificationCode(IssueVerificationCode {
        customer_id,
        code: code.as_str().to_string(),
        occurred_at: Utc::now(),
    });
    if let Err(resp) = dispatch_customer(&services, customer_id, cmd) {
        return resp;
    }
    tracing::info!(customer_id = %customer_id, email = customer.email(), code = code.as_str(), "verification code issued");

    (StatusCode::ACCEPTED, Json(serde_json::json!({ "sent": true }))).into_response()
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::LoginRequest>,
) -> axum::response::Response {
    let invalid = || errors::json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", "invalid e-mail or password");
    let Ok(email) = normalize_email(&body.email) else {
        return invalid();
    };

    if let Some(admin) = &services.config.admin {
        if admin.email.eq_ignore_ascii_case(&email) && admin.password == body.password {
            tracing::info!(email = %email, "operator login");
            return issue_session(&services, PrincipalId::new(), &email, vec![Role::ADMIN]);
        }
    }

    let Some(entry) = services.customers.find_by_email(&email) else {
        return invalid();
    };
    let customer = match load_customer(&services, entry.customer_id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if !services.passwords.verify(&body.password, customer.password_hash()) {
        return invalid();
    }

    if !customer.is_verified() {
        if customer.verification_code().is_none() {
            let code = generate_verification_code();
            let cmd = CustomerCommand::IssueVerificationCode(IssueVerificationCode {
                customer_id: entry.customer_id,
                code: code.as_str().to_string(),
                occurred_at: Utc::now(),
            });
            if let Err(resp) = dispatch_customer(&services, entry.customer_id, cmd) {
                return resp;
            }
            tracing::info!(customer_id = %entry.customer_id, email = %email, code = code.as_str(), "verification code issued");
        }
        return verification_required(entry.customer_id);
    }

    tracing::info!(customer_id = %entry.customer_id, "login");
    customer_session(&services, &customer)
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> StatusCode {
    services.revoked.revoke(principal.token_id());
    tracing::info!(principal_id = %principal.principal_id(), "logout");
    StatusCode::NO_CONTENT
}

/// Always answers the same way so the endpoint cannot be used to probe for
/// registered addresses.
pub async fn request_login_link(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::TokenLoginRequest>,
) -> impl IntoResponse {
    let entry = normalize_email(&body.email)
        .ok()
        .and_then(|email| services.customers.find_by_email(&email));

    if let Some(entry) = entry {
        match services
            .tokens
            .issue_login_link(PrincipalId::from(entry.customer_id), &entry.email, Utc::now())
        {
            Ok((token, claims)) => {
                tracing::info!(customer_id = %entry.customer_id, link = %format!("/auth/token-login/{token}"), expires_at = %claims.expires_at, "login link issued");
            }
            Err(e) => tracing::error!(error = %e, "failed to issue login link"),
        }
    }

    (StatusCode::ACCEPTED, Json(serde_json::json!({ "message": TOKEN_LOGIN_ANSWER })))
}

pub async fn redeem_login_link(
    Extension(services): Extension<Arc<AppServices>>,
    Path(token): Path<String>,
) -> axum::response::Response {
    let claims = match services.jwt.validate_login_link(&token, Utc::now()) {
        Ok(c) => c,
        Err(e) => return errors::auth_error_to_response(e),
    };
    if !services.redeem_login_link(claims.jti) {
        return errors::json_error(StatusCode::UNAUTHORIZED, "link_used", "login link has already been used");
    }

    let customer = match load_customer(&services, claims.sub.as_customer_id()) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    tracing::info!(customer_id = %customer.id_typed(), "login link redeemed");
    customer_session(&services, &customer)
}
