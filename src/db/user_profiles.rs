//! User profile queries — contact lookup for price-drop alerts.

use anyhow::Result;
use uuid::Uuid;

use super::AdminDatabase;

impl AdminDatabase {
    /// Email address on file for an owner, if any.
    pub async fn get_owner_email(&self, user_id: Uuid) -> Result<Option<String>> {
        let email = sqlx::query_scalar::<_, Option<String>>(
            "SELECT email FROM user_profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(email.flatten().filter(|e| !e.trim().is_empty()))
    }
}
