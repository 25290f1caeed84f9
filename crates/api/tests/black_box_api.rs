use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

use woodhop_api::app::services::{AppServices, build_services};
use woodhop_api::config::{AdminAccount, ApiConfig};
use woodhop_auth::{JwtClaims, PrincipalId, Role};
use woodhop_core::CustomerId;
use woodhop_parties::Customer;

const JWT_SECRET: &str = "black-box-secret";
const ADMIN_EMAIL: &str = "ops@woodhop.test";
const ADMIN_PASSWORD: &str = "ops-password";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = ApiConfig {
            jwt_secret: JWT_SECRET.to_string(),
            password_hash_cost: 4,
            admin: Some(AdminAccount {
                email: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string(),
            }),
            ..ApiConfig::default()
        };
        let services = Arc::new(build_services(config).await.expect("services should start"));

        // Same router as prod, bound to an ephemeral port.
        let app = woodhop_api::app::build_app(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            services,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> reqwest::Response {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }

    // The API is eventually consistent (command path vs projection update).
    // Poll briefly until the read side catches up.
    async fn poll_get(&self, path: &str, token: Option<&str>, check: impl Fn(StatusCode, &Value) -> bool) -> Value {
        for _ in 0..200 {
            let res = self.get(path, token).await;
            let status = res.status();
            let body = res.json::<Value>().await.unwrap_or(Value::Null);
            if check(status, &body) {
                return body;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("{path} did not reach the expected state within timeout");
    }

    /// Read the code straight from the customer's stream (e-mail is only logged).
    fn verification_code(&self, customer_id: &str) -> String {
        let id: CustomerId = customer_id.parse().unwrap();
        let customer = self
            .services
            .load(id.as_aggregate_id(), |agg| Customer::empty(CustomerId::from(agg)))
            .unwrap();
        customer.verification_code().unwrap().to_string()
    }

    /// Signup, verify, and return (customer_id, session token).
    async fn verified_account(&self, email: &str, customer_type: &str) -> (String, String) {
        let res = self
            .post(
                "/auth/signup",
                None,
                json!({
                    "fullname": "Test Account",
                    "email": email,
                    "password": "timber-123",
                    "customer_type": customer_type,
                    "location": "Harare",
                }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let customer_id = res.json::<Value>().await.unwrap()["customer_id"].as_str().unwrap().to_string();

        let code = self.verification_code(&customer_id);
        let res = self
            .post(&format!("/auth/verify/{customer_id}"), None, json!({ "code": code }))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let token = res.json::<Value>().await.unwrap()["token"].as_str().unwrap().to_string();

        // The directory is fed asynchronously; wait for the account to show up.
        self.poll_get("/dashboard", Some(&token), |status, _| status == StatusCode::OK).await;
        (customer_id, token)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.services.shutdown();
        self.handle.abort();
    }
}

fn mint_jwt(roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(),
        email: "minted@woodhop.test".to_string(),
        roles,
        jti: Uuid::now_v7(),
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn public_pages_and_auth_boundary() {
    let server = TestServer::spawn().await;

    assert_eq!(server.get("/health", None).await.status(), StatusCode::OK);

    let home: Value = server.get("/", None).await.json().await.unwrap();
    assert!(home["featured_products"].as_array().unwrap().is_empty());

    assert_eq!(server.get("/whoami", None).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(server.get("/whoami", Some("not-a-jwt")).await.status(), StatusCode::UNAUTHORIZED);

    let res = server.get("/whoami", Some(&mint_jwt(vec![Role::INDIVIDUAL]))).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["roles"], json!(["individual"]));
}

#[tokio::test]
async fn unverified_accounts_must_verify_before_login() {
    let server = TestServer::spawn().await;
    let res = server
        .post(
            "/auth/signup",
            None,
            json!({
                "fullname": "Tendai Moyo",
                "email": "Tendai@Example.test",
                "password": "pine-and-oak",
                "customer_type": "Contractor",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let customer_id = res.json::<Value>().await.unwrap()["customer_id"].as_str().unwrap().to_string();

    let login = json!({ "email": "tendai@example.test", "password": "pine-and-oak" });
    let mut attempts = 0;
    let body: Value = loop {
        let res = server.post("/auth/login", None, login.clone()).await;
        if res.status() == StatusCode::FORBIDDEN || attempts == 200 {
            break res.json().await.unwrap();
        }
        attempts += 1;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    };
    assert_eq!(body["error"], "verification_required");

    let wrong = server
        .post(&format!("/auth/verify/{customer_id}"), None, json!({ "code": "000000" }))
        .await;
    let code = server.verification_code(&customer_id);
    if code != "000000" {
        assert!(wrong.status().is_client_error());
    }

    let digits: Vec<String> = code.chars().map(String::from).collect();
    let res = server
        .post(
            &format!("/auth/verify/{customer_id}"),
            None,
            json!({
                "code_1": digits[0], "code_2": digits[1], "code_3": digits[2],
                "code_4": digits[3], "code_5": digits[4], "code_6": digits[5],
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.post("/auth/login", None, login).await;
    assert_eq!(res.status(), StatusCode::OK);
    let token = res.json::<Value>().await.unwrap()["token"].as_str().unwrap().to_string();

    let dashboard = server
        .poll_get("/dashboard", Some(&token), |status, _| status == StatusCode::OK)
        .await;
    assert_eq!(dashboard["kind"], "contractor");
    assert_eq!(dashboard["discount_label"], "Bronze (10%)");

    let wrong_password = server
        .post("/auth/login", None, json!({ "email": "tendai@example.test", "password": "nope" }))
        .await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn checkout_deducts_stock_through_the_saga() {
    let server = TestServer::spawn().await;
    let (_vendor_id, vendor) = server.verified_account("mill@woodhop.test", "Business").await;
    let (_shopper_id, shopper) = server.verified_account("shopper@woodhop.test", "Individual").await;

    let res = server
        .post(
            "/business/products",
            Some(&vendor),
            json!({
                "name": "Teak plank",
                "price": "45.00",
                "product_type": "Timber",
                "category": "Hardwood",
                "dimensions": "2x4x8",
                "initial_quantity": 10,
                "reorder_level": 3,
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let product_id = res.json::<Value>().await.unwrap()["id"].as_str().unwrap().to_string();

    // Individuals cannot sell.
    let res = server
        .post(
            "/business/products",
            Some(&shopper),
            json!({ "name": "x", "price": "1", "product_type": "t", "category": "c" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let product_path = format!("/product/{product_id}");
    server.poll_get(&product_path, None, |status, _| status == StatusCode::OK).await;

    // The bulk-order form offers the catalog categories to pick from.
    let bulk: Value = server.get("/bulk-order", Some(&vendor)).await.json().await.unwrap();
    assert_eq!(bulk["categories"], json!(["Hardwood"]));
    assert_eq!(bulk["offer"]["discount_percent"], 10);

    let res = server
        .post("/cart/add", None, json!({ "product_id": product_id, "quantity": 3 }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let session = res.headers()["x-cart-session"].to_str().unwrap().to_string();
    let cart: Value = res.json().await.unwrap();
    assert_eq!(cart["cart"]["count"], 3);
    assert_eq!(cart["cart"]["total"], 13_500);

    let res = server
        .client
        .post(server.url("/cart/checkout"))
        .bearer_auth(&shopper)
        .header("x-cart-session", &session)
        .json(&json!({ "delivery_option": "Pickup" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let order_id = res.json::<Value>().await.unwrap()["order_id"].as_str().unwrap().to_string();

    let inventory_path = format!("/api/inventory/{product_id}");
    server
        .poll_get(&inventory_path, Some(&shopper), |status, body| {
            status == StatusCode::OK && body["quantity_available"] == 7
        })
        .await;

    let journal: Value = server
        .get(&format!("/api/inventory-log?product_id={product_id}"), Some(&shopper))
        .await
        .json()
        .await
        .unwrap();
    let out = journal
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["action"] == "OUT")
        .expect("an OUT movement");
    assert_eq!(out["quantity"], 3);
    assert_eq!(out["reference"], format!("order:{order_id}:line:1:out"));

    let count: Value = server
        .client
        .get(server.url("/cart/count"))
        .header("x-cart-session", &session)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(count["count"], 0);

    // Cancelling returns the stock.
    let res = server
        .client
        .delete(server.url(&format!("/api/orders/{order_id}")))
        .bearer_auth(&shopper)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    server
        .poll_get(&inventory_path, Some(&shopper), |_, body| body["quantity_available"] == 10)
        .await;

    // Another account cannot read the order.
    let (_, stranger) = server.verified_account("stranger@woodhop.test", "Retailer").await;
    let res = server.get(&format!("/order/{order_id}"), Some(&stranger)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_links_are_single_use_and_logout_revokes() {
    let server = TestServer::spawn().await;
    let (customer_id, token) = server.verified_account("link@woodhop.test", "Retailer").await;

    // Same answer whether or not the address exists.
    let known: Value = server
        .post("/auth/token-login", None, json!({ "email": "link@woodhop.test" }))
        .await
        .json()
        .await
        .unwrap();
    let unknown: Value = server
        .post("/auth/token-login", None, json!({ "email": "nobody@woodhop.test" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(known, unknown);

    let id: CustomerId = customer_id.parse().unwrap();
    let (link, _) = server
        .services
        .tokens
        .issue_login_link(PrincipalId::from(id), "link@woodhop.test", Utc::now())
        .unwrap();
    let path = format!("/auth/token-login/{link}");
    assert_eq!(server.get(&path, None).await.status(), StatusCode::OK);
    assert_eq!(server.get(&path, None).await.status(), StatusCode::UNAUTHORIZED);

    // A session token is not a login link.
    assert_eq!(
        server.get(&format!("/auth/token-login/{token}"), None).await.status(),
        StatusCode::UNAUTHORIZED
    );

    assert_eq!(server.get("/whoami", Some(&token)).await.status(), StatusCode::OK);
    let res = server.post("/auth/logout", Some(&token), json!({})).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(server.get("/whoami", Some(&token)).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn operators_manage_suppliers_and_deliveries() {
    let server = TestServer::spawn().await;
    let res = server
        .post("/auth/login", None, json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let admin = res.json::<Value>().await.unwrap()["token"].as_str().unwrap().to_string();

    let res = server
        .post(
            "/api/suppliers",
            Some(&admin),
            json!({ "name": "Border Timbers", "contacts": "+263 20 000", "email": "sales@border.test" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let supplier_id = res.json::<Value>().await.unwrap()["id"].as_str().unwrap().to_string();

    let supplier_path = format!("/api/suppliers/{supplier_id}");
    server.poll_get(&supplier_path, Some(&admin), |status, _| status == StatusCode::OK).await;

    let shopper = mint_jwt(vec![Role::INDIVIDUAL]);
    assert_eq!(server.get("/api/suppliers", Some(&shopper)).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(server.get("/api/deliveries", Some(&shopper)).await.status(), StatusCode::FORBIDDEN);

    let deliveries: Value = server.get("/api/deliveries", Some(&admin)).await.json().await.unwrap();
    assert!(deliveries.as_array().unwrap().is_empty());
}
