use async_trait::async_trait;
use uuid::Uuid;

use crate::models::usermodel::User;

use super::db::DBClient;

pub(crate) const USER_COLUMNS: &str = r#"
    id, first_name, last_name, email, wallet_address,
    subscription_active, subscription_since, referral, rank,
    created_at, updated_at
"#;

#[async_trait]
pub trait UserExt {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;

    /// Every ranked user, best rank first. Unranked users are left out.
    async fn get_users_by_rank(&self) -> Result<Vec<User>, sqlx::Error>;
}

#[async_trait]
impl UserExt for DBClient {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_users_by_rank(&self) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE rank > 0 ORDER BY rank ASC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
    }
}
