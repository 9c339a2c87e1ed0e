//! Repository for the key-value settings table.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;

use ledgerline_core::settings::SettingsRepositoryTrait;
use ledgerline_core::Result;

use super::model::AppSettingDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::app_settings;

pub struct SettingsRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SettingsRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        SettingsRepository { pool, writer }
    }
}

#[async_trait]
impl SettingsRepositoryTrait for SettingsRepository {
    fn get_setting(&self, setting_key: &str) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        let row = app_settings::table
            .find(setting_key)
            .first::<AppSettingDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(|r| r.setting_value))
    }

    async fn set_setting(&self, setting_key: &str, setting_value: &str) -> Result<()> {
        let key = setting_key.to_string();
        let value = setting_value.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let now = Utc::now().to_rfc3339();
                let row = AppSettingDB {
                    setting_key: key,
                    setting_value: value.clone(),
                    updated_at: now.clone(),
                };
                diesel::insert_into(app_settings::table)
                    .values(&row)
                    .on_conflict(app_settings::setting_key)
                    .do_update()
                    .set((
                        app_settings::setting_value.eq(value),
                        app_settings::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
