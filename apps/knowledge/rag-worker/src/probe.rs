use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use stream_worker::ReadinessProbe;

/// `/ready` check against the Postgres pool.
pub struct PostgresProbe {
    db: DatabaseConnection,
}

impl PostgresProbe {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReadinessProbe for PostgresProbe {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn check(&self) -> Result<(), String> {
        database::postgres::check_health(&self.db)
            .await
            .map_err(|e| e.to_string())
    }
}
