use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::error::DatabaseError;

const CREATE_VACANCIES: &str =
    include_str!("../migrations/2024-06-01-000000_create_vacancies/up.sql");

/// Opens the listings database and makes sure the schema exists.
pub fn establish_connection(database_url: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut connection = SqliteConnection::establish(database_url)?;

    connection.batch_execute("PRAGMA busy_timeout = 5000;")?;
    connection.batch_execute(CREATE_VACANCIES)?;

    log::debug!("Connected to {}", database_url);

    Ok(connection)
}
