//! PostgreSQL-backed campaign store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use bsn_core::{
    BsnError, BsnResult, CampaignId, CampaignRecord, CampaignState, CampaignStore, DbTarget,
    RunningCampaign,
};

const SELECT_CAMPAIGN: &str = "SELECT id, name, state, start_time, end_time, notes, db_host, db_name,
            script_file_name, type_code, sensor_codes, sampling_hz, connectivity
     FROM campaigns";

#[derive(Debug, sqlx::FromRow)]
struct CampaignRow {
    id: i64,
    name: String,
    state: String,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    notes: Option<String>,
    db_host: Option<String>,
    db_name: Option<String>,
    script_file_name: Option<String>,
    type_code: Option<String>,
    sensor_codes: Vec<String>,
    sampling_hz: Option<i32>,
    connectivity: Option<String>,
}

impl TryFrom<CampaignRow> for CampaignRecord {
    type Error = BsnError;

    fn try_from(row: CampaignRow) -> BsnResult<Self> {
        let state = CampaignState::parse(&row.state).ok_or_else(|| {
            BsnError::Store(format!("campaign {} has unknown state '{}'", row.id, row.state))
        })?;
        Ok(CampaignRecord {
            id: row.id,
            name: row.name,
            state,
            start_time: row.start_time,
            end_time: row.end_time,
            notes: row.notes,
            target: DbTarget::from_parts(row.db_host.as_deref(), row.db_name.as_deref()),
            script_file_name: row.script_file_name,
            type_code: row.type_code,
            sensor_codes: row.sensor_codes,
            sampling_hz: row.sampling_hz,
            connectivity: row.connectivity,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RunningRow {
    id: i64,
    start_time: Option<DateTime<Utc>>,
    db_host: Option<String>,
    db_name: Option<String>,
}

fn store_error(e: sqlx::Error) -> BsnError {
    BsnError::Store(e.to_string())
}

pub struct PgCampaignStore {
    pool: PgPool,
}

impl PgCampaignStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn update(&self, id: CampaignId, sql: &str, note: Option<&str>) -> BsnResult<()> {
        let mut query = sqlx::query(sql).bind(id);
        if let Some(note) = note {
            query = query.bind(note);
        }
        let result = query.execute(&self.pool).await.map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(BsnError::not_found(format!("campaign {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl CampaignStore for PgCampaignStore {
    async fn find_running(&self) -> BsnResult<Vec<RunningCampaign>> {
        let rows = sqlx::query_as::<_, RunningRow>(
            "SELECT id, start_time, db_host, db_name FROM campaigns
             WHERE state = 'running'
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows
            .into_iter()
            .map(|r| RunningCampaign {
                id: r.id,
                start_time: r.start_time,
                target: DbTarget::from_parts(r.db_host.as_deref(), r.db_name.as_deref()),
            })
            .collect())
    }

    async fn force_terminate(&self, id: CampaignId, note: &str) -> BsnResult<()> {
        self.update(
            id,
            "UPDATE campaigns
             SET state = 'terminated',
                 end_time = now(),
                 notes = CASE WHEN notes IS NULL OR notes = '' THEN $2
                              ELSE notes || E'\\n' || $2 END
             WHERE id = $1",
            Some(note),
        )
        .await
    }

    async fn get_target(&self, id: CampaignId) -> BsnResult<Option<DbTarget>> {
        let row: Option<(Option<String>, Option<String>)> =
            sqlx::query_as("SELECT db_host, db_name FROM campaigns WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;
        Ok(row.and_then(|(host, db)| DbTarget::from_parts(host.as_deref(), db.as_deref())))
    }

    async fn get(&self, id: CampaignId) -> BsnResult<Option<CampaignRecord>> {
        let row = sqlx::query_as::<_, CampaignRow>(&format!("{SELECT_CAMPAIGN} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.map(CampaignRecord::try_from).transpose()
    }

    async fn mark_terminated(&self, id: CampaignId) -> BsnResult<()> {
        self.update(
            id,
            "UPDATE campaigns SET state = 'terminated', end_time = now() WHERE id = $1",
            None,
        )
        .await
    }
}
