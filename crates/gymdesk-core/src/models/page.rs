//! Normalization of list responses.
//!
//! The backend answers list endpoints in one of three shapes: a paginated
//! envelope (`results`/`count`/`next`/`previous`), an object wrapping the
//! rows in `data`, or a bare array. [`ListResponse::into_page`] is the one
//! place those shapes are told apart; everything downstream sees [`Page`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total rows across all pages.
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Paginated {
        results: Vec<T>,
        count: u64,
        #[serde(default)]
        next: Option<String>,
        #[serde(default)]
        previous: Option<String>,
    },
    Wrapped {
        data: Vec<T>,
        #[serde(default)]
        count: Option<u64>,
    },
    Bare(Vec<T>),
}

impl<T> ListResponse<T> {
    pub fn into_page(self) -> Page<T> {
        match self {
            ListResponse::Paginated {
                results,
                count,
                next,
                previous,
            } => Page {
                items: results,
                count,
                next,
                previous,
            },
            ListResponse::Wrapped { data, count } => Page {
                count: count.unwrap_or(data.len() as u64),
                items: data,
                next: None,
                previous: None,
            },
            ListResponse::Bare(items) => Page {
                count: items.len() as u64,
                items,
                next: None,
                previous: None,
            },
        }
    }
}
