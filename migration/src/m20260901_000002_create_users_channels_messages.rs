use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS switchboard.users (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                email VARCHAR(255) NOT NULL UNIQUE,
                display_name VARCHAR(255) NOT NULL,
                password VARCHAR(255) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .await?;

        // last_sequence is the per-channel counter; it only moves forward
        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS switchboard.channels (
                id VARCHAR(64) PRIMARY KEY CHECK (id ~ '^[a-z0-9_-]{1,64}$'),
                last_sequence BIGINT NOT NULL DEFAULT 0 CHECK (last_sequence >= 0),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .await?;

        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS switchboard.messages (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                channel_id VARCHAR(64) NOT NULL REFERENCES switchboard.channels(id) ON DELETE CASCADE,
                sequence BIGINT NOT NULL,
                sender_user_id UUID NOT NULL REFERENCES switchboard.users(id) ON DELETE CASCADE,
                payload TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                UNIQUE(channel_id, sequence)
            )
        "#,
        )
        .await?;

        for table in ["users", "channels", "messages"] {
            db.execute_unprepared(&format!(
                "ALTER TABLE switchboard.{table} OWNER TO switchboard"
            ))
            .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        for table in ["messages", "channels", "users"] {
            db.execute_unprepared(&format!("DROP TABLE IF EXISTS switchboard.{table}"))
                .await?;
        }

        Ok(())
    }
}
