use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared("CREATE SCHEMA IF NOT EXISTS switchboard;")
            .await?;

        db.execute_unprepared("SET search_path TO switchboard, public;")
            .await?;

        // The application role owns everything it creates in the schema
        db.execute_unprepared(
            r#"
                DO $$ BEGIN
                    GRANT ALL ON SCHEMA switchboard TO switchboard;

                    ALTER DEFAULT PRIVILEGES IN SCHEMA switchboard GRANT ALL ON TABLES TO switchboard;
                    ALTER DEFAULT PRIVILEGES IN SCHEMA switchboard GRANT ALL ON SEQUENCES TO switchboard;
                END $$;
            "#,
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(
            r#"
                DO $$ BEGIN
                    ALTER DEFAULT PRIVILEGES IN SCHEMA switchboard REVOKE ALL ON SEQUENCES FROM switchboard;
                    ALTER DEFAULT PRIVILEGES IN SCHEMA switchboard REVOKE ALL ON TABLES FROM switchboard;
                    REVOKE ALL ON SCHEMA switchboard FROM switchboard;
                END $$;
            "#,
        )
        .await?;

        db.execute_unprepared("DROP SCHEMA IF EXISTS switchboard CASCADE;")
            .await?;

        Ok(())
    }
}
