//! WireMock-based PetKit cloud mocking infrastructure
//!
//! One mock server plays both the passport host (region list) and the
//! regional gateway, which lives under `/latest/`.

use serde_json::{json, Value};
use wiremock::{
    matchers::{body_string_contains, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

pub const SESSION_ID: &str = "session-1";
pub const FEEDER_ID: &str = "100234";

/// Mock PetKit cloud for testing
pub struct MockPetkitServer {
    pub server: MockServer,
    pub base_url: String,
}

impl MockPetkitServer {
    /// Start a server with no endpoints mounted
    pub async fn start_empty() -> Self {
        let server = MockServer::start().await;
        let base_url = format!("{}/", server.uri());
        Self { server, base_url }
    }

    /// Start a server with region, login, roster and one feeder mounted
    pub async fn start() -> Self {
        let mock = Self::start_empty().await;
        mock.mock_region_servers().await;
        mock.mock_login().await;
        mock.mock_roster(json!([
            {"type": "Feeder", "data": {"id": 100234, "type": "FeederMini"}},
            {"type": "Litter", "data": {"id": 555, "type": "T3"}}
        ]))
        .await;
        mock.mock_device_detail("feedermini", FEEDER_ID, feeder_detail(150))
            .await;
        mock
    }

    /// Gateway base the region list points at
    pub fn gateway(&self) -> String {
        format!("{}latest/", self.base_url)
    }

    pub async fn mock_region_servers(&self) {
        Mock::given(method("GET"))
            .and(path("/v1/regionservers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "list": [
                        {"id": "US", "name": "United States", "gateway": self.gateway()},
                        {"id": "DE", "name": "Germany", "gateway": self.gateway()}
                    ]
                }
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_login(&self) {
        Mock::given(method("POST"))
            .and(path("/latest/user/login"))
            .and(body_string_contains("encrypt=1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"session": {"id": SESSION_ID, "expiresIn": 3600}}
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_login_rejected(&self) {
        Mock::given(method("POST"))
            .and(path("/latest/user/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"code": 122, "msg": "Account or password incorrect"}
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_roster(&self, devices: Value) {
        Mock::given(method("GET"))
            .and(path("/latest/discovery/device_roster"))
            .and(header("X-Session", SESSION_ID))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"result": {"devices": devices}})),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_device_detail(&self, device_type: &str, id: &str, detail: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/latest/{device_type}/device_detail")))
            .and(query_param("id", id))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": detail})))
            .mount(&self.server)
            .await;
    }

    /// Every gateway request answers with `status`
    pub async fn mock_gateway_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/latest/discovery/device_roster"))
            .respond_with(ResponseTemplate::new(status).set_body_string("unavailable"))
            .mount(&self.server)
            .await;
    }
}

/// Device detail document as the vendor returns it
pub fn feeder_detail(lifetime_total: i64) -> Value {
    json!({
        "id": 100234,
        "name": "Kitchen",
        "timezone": 0.0,
        "feed": {
            "repeats": "1,2,3,4,5,6,7",
            "items": [
                {"time": 28800, "amount": 20, "name": "Breakfast"},
                {"time": 64800, "amount": 30, "name": "Dinner"}
            ]
        },
        "state": {
            "food": 1,
            "feeding": 0,
            "feedState": {"realAmountTotal": lifetime_total}
        }
    })
}
