//! Mercado Pago REST client (no SDK dependency)

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{
    BankTransfer, CreatePayment, GatewayError, GatewayPayment, GatewayResult, OAuthGrant,
    PaymentGateway, TransferReceipt,
};

const DEFAULT_API_BASE: &str = "https://api.mercadopago.com";
const AUTHORIZATION_BASE: &str = "https://auth.mercadopago.com.br/authorization";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application credentials used for the seller OAuth flow
#[derive(Debug, Clone, Default)]
pub struct OAuthApp {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

pub struct MercadoPagoClient {
    http: reqwest::Client,
    api_base: String,
    oauth: OAuthApp,
}

impl MercadoPagoClient {
    pub fn new(api_base: Option<String>, oauth: OAuthApp) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            oauth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Send a request and decode a 2xx JSON body
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> GatewayResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "Mercado Pago request rejected");
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    fn oauth_credentials(&self) -> GatewayResult<(&str, &str)> {
        match (&self.oauth.client_id, &self.oauth.client_secret) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(GatewayError::NotConfigured("MP_CLIENT_ID / MP_CLIENT_SECRET")),
        }
    }

    async fn token_request(&self, form: serde_json::Value) -> GatewayResult<OAuthGrant> {
        let raw: RawToken = self
            .send(self.http.post(self.url("/oauth/token")).json(&form))
            .await?;
        Ok(raw.into())
    }
}

/// Accept ids that arrive as JSON numbers or strings
fn id_string<'de, D: serde::Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(de)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unexpected id: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
struct RawPayment {
    #[serde(deserialize_with = "id_string")]
    id: String,
    status: String,
    #[serde(default)]
    status_detail: Option<String>,
    #[serde(default)]
    external_reference: Option<String>,
    #[serde(default)]
    point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Deserialize)]
struct PointOfInteraction {
    #[serde(default)]
    transaction_data: Option<TransactionData>,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    #[serde(default)]
    qr_code: Option<String>,
    #[serde(default)]
    ticket_url: Option<String>,
}

impl From<RawPayment> for GatewayPayment {
    fn from(raw: RawPayment) -> Self {
        let data = raw
            .point_of_interaction
            .and_then(|p| p.transaction_data);
        let (pix_qr_code, pix_ticket_url) = match data {
            Some(d) => (d.qr_code, d.ticket_url),
            None => (None, None),
        };
        Self {
            id: raw.id,
            status: raw.status,
            status_detail: raw.status_detail,
            external_reference: raw.external_reference,
            pix_qr_code,
            pix_ticket_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawToken {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(deserialize_with = "id_string")]
    user_id: String,
    #[serde(default)]
    public_key: Option<String>,
    #[serde(default)]
    expires_in: i64,
}

impl From<RawToken> for OAuthGrant {
    fn from(raw: RawToken) -> Self {
        Self {
            access_token: raw.access_token,
            refresh_token: raw.refresh_token,
            user_id: raw.user_id,
            public_key: raw.public_key,
            expires_in: raw.expires_in,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTransfer {
    #[serde(deserialize_with = "id_string")]
    id: String,
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn create_payment(
        &self,
        access_token: &str,
        request: &CreatePayment,
        idempotency_key: &str,
    ) -> GatewayResult<GatewayPayment> {
        let raw: RawPayment = self
            .send(
                self.http
                    .post(self.url("/v1/payments"))
                    .bearer_auth(access_token)
                    .header("X-Idempotency-Key", idempotency_key)
                    .json(request),
            )
            .await?;
        Ok(raw.into())
    }

    async fn get_payment(&self, access_token: &str, payment_id: &str) -> GatewayResult<GatewayPayment> {
        let raw: RawPayment = self
            .send(
                self.http
                    .get(self.url(&format!("/v1/payments/{payment_id}")))
                    .bearer_auth(access_token),
            )
            .await?;
        Ok(raw.into())
    }

    async fn refund_payment(
        &self,
        access_token: &str,
        payment_id: &str,
        idempotency_key: &str,
    ) -> GatewayResult<()> {
        let _: serde_json::Value = self
            .send(
                self.http
                    .post(self.url(&format!("/v1/payments/{payment_id}/refunds")))
                    .bearer_auth(access_token)
                    .header("X-Idempotency-Key", idempotency_key)
                    .json(&serde_json::json!({})),
            )
            .await?;
        Ok(())
    }

    async fn exchange_code(&self, code: &str) -> GatewayResult<OAuthGrant> {
        let (client_id, client_secret) = self.oauth_credentials()?;
        let redirect_uri = self
            .oauth
            .redirect_uri
            .as_deref()
            .ok_or(GatewayError::NotConfigured("MP_OAUTH_REDIRECT_URI"))?;
        self.token_request(serde_json::json!({
            "client_secret": client_secret,
            "client_id": client_id,
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": redirect_uri,
        }))
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> GatewayResult<OAuthGrant> {
        let (client_id, client_secret) = self.oauth_credentials()?;
        self.token_request(serde_json::json!({
            "client_secret": client_secret,
            "client_id": client_id,
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        }))
        .await
    }

    async fn create_bank_transfer(
        &self,
        access_token: &str,
        transfer: &BankTransfer,
        idempotency_key: &str,
    ) -> GatewayResult<TransferReceipt> {
        let raw: RawTransfer = self
            .send(
                self.http
                    .post(self.url("/v1/transaction_orders"))
                    .bearer_auth(access_token)
                    .header("X-Idempotency-Key", idempotency_key)
                    .json(transfer),
            )
            .await?;
        Ok(TransferReceipt { id: raw.id })
    }

    fn authorization_url(&self, state: &str) -> GatewayResult<String> {
        let client_id = self
            .oauth
            .client_id
            .as_deref()
            .ok_or(GatewayError::NotConfigured("MP_CLIENT_ID"))?;
        let redirect_uri = self
            .oauth
            .redirect_uri
            .as_deref()
            .ok_or(GatewayError::NotConfigured("MP_OAUTH_REDIRECT_URI"))?;

        let mut url = reqwest::Url::parse(AUTHORIZATION_BASE)
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("platform_id", "mp")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);
        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(oauth: OAuthApp) -> MercadoPagoClient {
        MercadoPagoClient::new(None, oauth).unwrap()
    }

    #[test]
    fn test_raw_payment_with_numeric_id_and_pix_data() {
        let raw: RawPayment = serde_json::from_value(serde_json::json!({
            "id": 1234567890u64,
            "status": "pending",
            "status_detail": "pending_waiting_transfer",
            "external_reference": "order-1",
            "point_of_interaction": {
                "transaction_data": { "qr_code": "000201...", "ticket_url": "https://mp/ticket" }
            }
        }))
        .unwrap();
        let payment: GatewayPayment = raw.into();
        assert_eq!(payment.id, "1234567890");
        assert_eq!(payment.pix_qr_code.as_deref(), Some("000201..."));
        assert_eq!(payment.external_reference.as_deref(), Some("order-1"));
    }

    #[test]
    fn test_raw_token_numeric_user_id() {
        let raw: RawToken = serde_json::from_value(serde_json::json!({
            "access_token": "APP_USR-1",
            "refresh_token": "TG-1",
            "user_id": 42,
            "public_key": "APP_USR-pk",
            "expires_in": 15552000
        }))
        .unwrap();
        let grant: OAuthGrant = raw.into();
        assert_eq!(grant.user_id, "42");
        assert_eq!(grant.expires_in, 15_552_000);
    }

    #[test]
    fn test_authorization_url() {
        let c = client(OAuthApp {
            client_id: Some("123".into()),
            client_secret: Some("s".into()),
            redirect_uri: Some("https://app.example.com/oauth/callback".into()),
        });
        let url = c.authorization_url("t1_1700_abc").unwrap();
        assert!(url.starts_with("https://auth.mercadopago.com.br/authorization?client_id=123"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("platform_id=mp"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Foauth%2Fcallback"));
        assert!(url.contains("state=t1_1700_abc"));
    }

    #[test]
    fn test_authorization_url_requires_config() {
        let c = client(OAuthApp::default());
        assert!(matches!(
            c.authorization_url("s"),
            Err(GatewayError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_api_base_trailing_slash() {
        let c = MercadoPagoClient::new(Some("http://localhost:9000/".into()), OAuthApp::default())
            .unwrap();
        assert_eq!(c.url("/v1/payments"), "http://localhost:9000/v1/payments");
    }
}
