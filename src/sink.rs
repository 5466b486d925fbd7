use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use diesel::prelude::*;
use diesel::sqlite::{Sqlite, SqliteConnection};

use crate::database::establish_connection;
use crate::error::DatabaseError;
use crate::models::{Listing, NewVacancy, Vacancy};
use crate::schema::vacancies;

/// Persists listings at most once per `link`.
pub trait ListingSink: Send + Sync {
    /// Returns `true` when the listing was newly stored, `false` for a
    /// duplicate or a storage failure. Never panics on storage errors.
    fn save(&self, listing: &Listing) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct VacancyFilter {
    pub source: Option<String>,
    pub company: Option<String>,
}

pub struct VacancyPage {
    pub vacancies: Vec<Vacancy>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub pages: i64,
}

pub struct VacancyStats {
    pub total: i64,
    pub by_source: BTreeMap<String, i64>,
}

/// SQLite-backed sink. One connection, serialized behind a mutex; the unique
/// index on `link` plus `INSERT OR IGNORE` decides the winner of a race.
pub struct SqliteSink {
    connection: Mutex<SqliteConnection>,
}

impl SqliteSink {
    pub fn open(database_url: &str) -> Result<Self, DatabaseError> {
        let connection = establish_connection(database_url)?;

        Ok(SqliteSink {
            connection: Mutex::new(connection),
        })
    }

    fn connection(&self) -> MutexGuard<'_, SqliteConnection> {
        // A panic while holding the lock cannot leave the connection half-written:
        // every statement is its own transaction.
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn count(&self) -> Result<i64, DatabaseError> {
        let connection = &mut *self.connection();

        let total = vacancies::table.count().get_result(connection)?;

        Ok(total)
    }

    pub fn list(
        &self,
        filter: &VacancyFilter,
        page: i64,
        per_page: i64,
    ) -> Result<VacancyPage, DatabaseError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let connection = &mut *self.connection();

        let total: i64 = filtered(filter).count().get_result(connection)?;

        let rows = filtered(filter)
            .order(vacancies::id.desc())
            .limit(per_page)
            .offset((page - 1) * per_page)
            .select(Vacancy::as_select())
            .load(connection)?;

        Ok(VacancyPage {
            vacancies: rows,
            total,
            page,
            per_page,
            pages: (total + per_page - 1) / per_page,
        })
    }

    pub fn stats(&self) -> Result<VacancyStats, DatabaseError> {
        let connection = &mut *self.connection();

        let by_source: Vec<(String, i64)> = vacancies::table
            .group_by(vacancies::source)
            .select((vacancies::source, diesel::dsl::count_star()))
            .load(connection)?;

        Ok(VacancyStats {
            total: by_source.iter().map(|(_, count)| count).sum(),
            by_source: by_source.into_iter().collect(),
        })
    }

    pub fn clear(&self) -> Result<usize, DatabaseError> {
        let connection = &mut *self.connection();

        let deleted = diesel::delete(vacancies::table).execute(connection)?;

        log::info!("Cleared {} vacancies.", deleted);

        Ok(deleted)
    }
}

impl ListingSink for SqliteSink {
    fn save(&self, listing: &Listing) -> bool {
        if listing.link.trim().is_empty() {
            log::warn!(
                "Skipping {} listing {:?} without a link.",
                listing.source,
                listing.title
            );
            return false;
        }

        let connection = &mut *self.connection();

        let result = diesel::insert_or_ignore_into(vacancies::table)
            .values(NewVacancy::from(listing))
            .execute(connection);

        match result {
            Ok(inserted) => inserted > 0,
            Err(e) => {
                log::error!("Failed to save vacancy {}. {}", listing.link, e);
                false
            }
        }
    }
}

fn filtered(filter: &VacancyFilter) -> vacancies::BoxedQuery<'static, Sqlite> {
    let mut query = vacancies::table.into_boxed();

    if let Some(source) = &filter.source {
        query = query.filter(vacancies::source.eq(source.clone()));
    }

    if let Some(company) = &filter.company {
        query = query.filter(vacancies::company.like(format!("%{}%", company)));
    }

    query
}
