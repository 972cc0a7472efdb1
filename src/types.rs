//! The `{ok, msg, data}` response envelope consumed by the (out-of-scope)
//! transport layer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseRes {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl BaseRes {
    pub fn ok() -> Self {
        Self {
            ok: true,
            msg: None,
            data: None,
        }
    }

    pub fn ok_with_data<T: Serialize>(data: T) -> Self {
        Self {
            ok: true,
            msg: None,
            data: serde_json::to_value(data).ok(),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            msg: Some(msg.into()),
            data: None,
        }
    }
}
