use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppUser {
    pub id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub status: String,
}

pub async fn get_user(pool: &PgPool, user_id: Uuid) -> Result<Option<AppUser>, sqlx::Error> {
    sqlx::query_as::<_, AppUser>("SELECT id, email, phone, status FROM app_users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}
