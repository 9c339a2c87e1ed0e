//! Single-writer actor. Jobs run on a dedicated thread, each wrapped in
//! an immediate transaction so a failed closure rolls back every write
//! it made, queue entries included.

use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use ledgerline_core::errors::{DatabaseError, Error, Result};

use crate::errors::StorageError;

type WriteJob = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

#[derive(Clone)]
pub struct WriteHandle {
    sender: mpsc::UnboundedSender<WriteJob>,
}

impl WriteHandle {
    /// Run `job` on the writer thread inside a transaction and await its
    /// result. An `Err` return rolls the transaction back.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let wrapped: WriteJob = Box::new(move |conn| {
            let result = run_in_transaction(conn, job);
            let _ = result_tx.send(result);
        });

        self.sender.send(wrapped).map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Write actor is no longer running".to_string(),
            ))
        })?;
        result_rx.await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Write actor dropped the job before completion".to_string(),
            ))
        })?
    }
}

/// Spawn the writer thread. The handle is cheap to clone; dropping every
/// clone shuts the thread down.
pub fn spawn_writer(pool: Pool<ConnectionManager<SqliteConnection>>) -> WriteHandle {
    let (sender, mut receiver) = mpsc::unbounded_channel::<WriteJob>();

    std::thread::spawn(move || {
        while let Some(job) = receiver.blocking_recv() {
            match pool.get() {
                Ok(mut conn) => job(&mut conn),
                // Dropping the job closes its oneshot; the caller sees
                // the actor failure instead of hanging.
                Err(e) => error!("Write actor could not get a connection: {}", e),
            }
        }
    });

    WriteHandle { sender }
}

enum WriterTxError {
    App(Error),
    Sql(diesel::result::Error),
}

impl From<diesel::result::Error> for WriterTxError {
    fn from(err: diesel::result::Error) -> Self {
        WriterTxError::Sql(err)
    }
}

fn run_in_transaction<T>(
    conn: &mut SqliteConnection,
    job: impl FnOnce(&mut SqliteConnection) -> Result<T>,
) -> Result<T> {
    conn.immediate_transaction::<T, WriterTxError, _>(|tx| job(tx).map_err(WriterTxError::App))
        .map_err(|err| match err {
            WriterTxError::App(e) => e,
            WriterTxError::Sql(e) => Error::from(StorageError::from(e)),
        })
}
