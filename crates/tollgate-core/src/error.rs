/// Gate-check failures.
///
/// These are deliberately not HTTP errors: the callers are AI coding
/// assistants parsing response text, so each variant carries a readable
/// notice that the router wraps in a completion-shaped body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("api key not found")]
    KeyNotFound,
    #[error("api key invalid")]
    KeyInvalid,
    #[error("api key quota exceeded")]
    KeyQuotaExceeded,
    #[error("subscription inactive")]
    UserSubscriptionInactive,
    #[error("user quota exceeded")]
    UserQuotaExceeded,
    #[error("store lookup failed: {0}")]
    Store(String),
}

impl GateError {
    /// Stable machine-readable code, also used as the notice title.
    pub fn code(&self) -> &'static str {
        match self {
            GateError::KeyNotFound => "key_not_found",
            GateError::KeyInvalid => "key_invalid",
            GateError::KeyQuotaExceeded => "key_quota_exceeded",
            GateError::UserSubscriptionInactive => "subscription_inactive",
            GateError::UserQuotaExceeded => "user_quota_exceeded",
            GateError::Store(_) => "lookup_failed",
        }
    }

    /// Human-readable text delivered to the calling assistant.
    pub fn notice(&self) -> &'static str {
        match self {
            GateError::KeyNotFound => {
                "The API key was not recognized. Please check the key configured in your client."
            }
            GateError::KeyInvalid => {
                "This API key is disabled or expired. Create a new key in the dashboard."
            }
            GateError::KeyQuotaExceeded => {
                "This API key has reached its monthly quota. Raise the key limit or wait for the next billing cycle."
            }
            GateError::UserSubscriptionInactive => {
                "Your subscription is not active. Renew it to continue using the service."
            }
            GateError::UserQuotaExceeded => {
                "Your account has reached its plan quota for this billing cycle."
            }
            GateError::Store(_) => {
                "The service could not verify your key right now. Please retry shortly."
            }
        }
    }
}
