use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header names used to propagate the resolved identity to downstream
/// services behind this API.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// The identity resolved by the auth gate for a protected request.
///
/// Inserted into the request extensions by the gate middleware; handlers
/// receive it with `web::ReqData<Identity>`. This is identity only, no
/// roles -- ownership checks are equality checks in the handlers.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}
