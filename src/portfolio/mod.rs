//! Portfolio content
//!
//! [`PortfolioSnapshot`] is the set of public sections as loaded for one
//! request; [`PortfolioView`] is the same data with every asset exchanged for
//! a signed URL. [`admin::AdminService`] backs the admin panel and
//! [`contact::ContactService`] takes in visitor messages.

pub mod admin;
pub mod contact;
pub mod snapshot;

pub use admin::AdminService;
pub use contact::{ContactForm, ContactService};
pub use snapshot::{load_section, PortfolioSnapshot, PortfolioView, SectionView, PUBLIC_SECTIONS};
