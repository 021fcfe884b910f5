use url::form_urlencoded;

use crux_http::Http;

use crate::event::{Event, Secret};
use crate::model::{AttachmentId, ChatConfig, Cursor, MessageId};

pub type HttpCapability = Http<Event>;

/// Contract-scoped endpoint table. Paths mirror the chat API contract; the
/// bases stay opaque strings so relative URLs resolved by the shell keep
/// working.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    api_base: String,
    ws_base: String,
    contract_id: String,
}

impl Endpoints {
    #[must_use]
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            ws_base: config.ws_base_url.trim_end_matches('/').to_string(),
            contract_id: config.contract_id.as_str().to_string(),
        }
    }

    #[must_use]
    pub fn messages(&self, page_size: u32) -> String {
        format!(
            "{}/contracts/{}/messages/?page_size={}",
            self.api_base, self.contract_id, page_size
        )
    }

    #[must_use]
    pub fn events(&self, cursor: &Cursor) -> String {
        format!(
            "{}/contracts/{}/events/?since={}",
            self.api_base,
            self.contract_id,
            encode_query_value(&cursor.0)
        )
    }

    #[must_use]
    pub fn attachments(&self) -> String {
        format!("{}/contracts/{}/attachments/", self.api_base, self.contract_id)
    }

    #[must_use]
    pub fn presign(&self, attachment_id: &AttachmentId) -> String {
        format!(
            "{}/contracts/{}/attachments/{}/presign/",
            self.api_base,
            self.contract_id,
            attachment_id.as_str()
        )
    }

    #[must_use]
    pub fn reports(&self, message_id: &MessageId) -> String {
        format!(
            "{}/contracts/{}/messages/{}/reports/",
            self.api_base,
            self.contract_id,
            message_id.as_str()
        )
    }

    /// Socket endpoint; the bearer credential travels as a query parameter,
    /// percent-encoded.
    #[must_use]
    pub fn socket(&self, token: Option<&Secret>) -> String {
        let token = token.map(Secret::expose).unwrap_or_default();
        format!(
            "{}/contracts/{}/?token={}",
            self.ws_base,
            self.contract_id,
            encode_query_value(token)
        )
    }
}

fn encode_query_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
