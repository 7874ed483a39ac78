//! Admin response envelope. Every panel handler recovers its result into
//! this shape; the UI only ever reads `success`, `msg`, and `obj`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default)]
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obj: Option<Value>,
}

impl ApiResponse {
    pub fn ok(obj: impl Serialize) -> Self {
        Self {
            success: true,
            msg: String::new(),
            obj: serde_json::to_value(obj).ok(),
        }
    }

    pub fn ok_msg(msg: impl Into<String>) -> Self {
        Self {
            success: true,
            msg: msg.into(),
            obj: None,
        }
    }

    pub fn ok_msg_obj(msg: impl Into<String>, obj: impl Serialize) -> Self {
        Self {
            success: true,
            msg: msg.into(),
            obj: serde_json::to_value(obj).ok(),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            msg: msg.into(),
            obj: None,
        }
    }
}
