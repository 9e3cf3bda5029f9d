/// Session key holding the authenticated user id.
pub const USER_ID: &str = "user_id";
