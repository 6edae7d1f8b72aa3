//! Lookup contract for the remote user directory.

use async_trait::async_trait;
use common::UserId;

use crate::error::ClientError;

/// Translates a caller's email address to an internal user id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolves an email to a user id.
    ///
    /// Fails with [`ClientError::UserNotFound`] when the directory answers
    /// 404 and [`ClientError::Unavailable`] for any other remote failure.
    async fn find_user_id(&self, email: &str) -> Result<UserId, ClientError>;
}
