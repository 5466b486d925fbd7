// src/models.rs

use crate::schema::vacancies;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Salary placeholder used by sources when a listing carries no compensation.
pub const NOT_SPECIFIED: &str = "not specified";

/// A candidate vacancy as returned by a source. `link` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub title: String,
    pub company: String,
    pub salary: String,
    pub link: String,
    pub source: String,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = vacancies)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]

pub struct Vacancy {
    pub id: i32,
    pub title: String,
    pub company: String,
    pub salary: String,
    pub link: String,
    pub source: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = vacancies)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewVacancy<'a> {
    pub title: &'a str,
    pub company: &'a str,
    pub salary: &'a str,
    pub link: &'a str,
    pub source: &'a str,
}

impl<'a> From<&'a Listing> for NewVacancy<'a> {
    fn from(listing: &'a Listing) -> Self {
        NewVacancy {
            title: &listing.title,
            company: &listing.company,
            salary: &listing.salary,
            link: &listing.link,
            source: &listing.source,
        }
    }
}
