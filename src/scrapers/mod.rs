//! Scrapers for the primary blog and for third-party reference pages.
//!
//! Both scrapers drive a [`crate::browser::Browser`] and read fields with
//! [`crate::extract`], using the ordered candidate lists from
//! [`crate::selectors`].
//!
//! | Scraper | Module | Input | Failure reporting |
//! |---------|--------|-------|-------------------|
//! | Primary blog | [`source`] | Listing URL | Every failure returned in a [`crate::models::BatchOutcome`] |
//! | References | [`reference`] | Arbitrary URLs | Failures logged and dropped |
//!
//! # Common Patterns
//!
//! - One fresh page per URL, disposed before the call returns
//! - Items are scraped sequentially through [`crate::batch::run_batch`]
//! - A page missing its title or body is a failure, never a partial article

pub mod reference;
pub mod source;
