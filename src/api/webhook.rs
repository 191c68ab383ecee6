use log::error;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::sms::BankSmsReconciler;

/// Inbound SMS payload. Forwarding clients disagree on field names, so
/// the common alternates are accepted as aliases whether the payload
/// arrives as query parameters, a form body, or JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct SmsWebhookRequest {
    #[serde(alias = "from", alias = "address")]
    pub sender: String,
    #[serde(alias = "text", alias = "content", alias = "body", alias = "raw")]
    pub message: String,
}

/// Always returned with HTTP success: the forwarding client cannot act
/// on a failure and must not retry indefinitely, so the parse outcome is
/// reported in the body instead.
#[derive(Debug, Clone, Serialize)]
pub struct SmsWebhookResponse {
    pub success: bool,
    pub sms_id: Option<i64>,
    pub deposit_created: bool,
    pub parsed_amount: Option<Decimal>,
    pub error: Option<String>,
}

/// Webhook entry point. Never propagates processing failures to the
/// caller; they land on the SMS row or in the response body.
pub async fn handle_sms_webhook(
    reconciler: &BankSmsReconciler,
    request: SmsWebhookRequest,
) -> SmsWebhookResponse {
    match reconciler.ingest(&request.sender, &request.message).await {
        Ok(sms) => SmsWebhookResponse {
            success: sms.deposit_created,
            sms_id: sms.id,
            deposit_created: sms.deposit_created,
            parsed_amount: sms.parsed_amount,
            error: sms.error_message,
        },
        Err(err) => {
            error!("SMS webhook processing failed: {}", err);
            SmsWebhookResponse {
                success: false,
                sms_id: None,
                deposit_created: false,
                parsed_amount: None,
                error: Some(err.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_fallback_field_names() {
        let from_json: SmsWebhookRequest =
            serde_json::from_str(r#"{"from": "VCB", "text": "+500k USER1"}"#).unwrap();
        assert_eq!(from_json.sender, "VCB");
        assert_eq!(from_json.message, "+500k USER1");

        let canonical: SmsWebhookRequest =
            serde_json::from_str(r#"{"sender": "VCB", "message": "+500k USER1"}"#).unwrap();
        assert_eq!(canonical.sender, from_json.sender);
        assert_eq!(canonical.message, from_json.message);
    }
}
