//! SmartLead → Twenty CRM bridge
//!
//! Receives SmartLead lead-status webhooks and mirrors them into Twenty via
//! its GraphQL API: companies and people are found or created, positive
//! replies become opportunities, everything else becomes a review task, and
//! each event is logged as a note linked to whatever records exist.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `errors`: HTTP boundary and CRM call error types.
//! - `graphql_client`: Retrying GraphQL client.
//! - `handlers`: Application state, health check and router.
//! - `resolver`: Company and person find-or-create.
//! - `sync`: Event classification and CRM outcome building.
//! - `twenty`: Twenty GraphQL operations.
//! - `webhook_handler`: SmartLead webhook handler.
//! - `webhook_models`: Webhook payload models.

pub mod config;
pub mod errors;
pub mod graphql_client;
pub mod handlers;
pub mod resolver;
pub mod sync;
pub mod twenty;
pub mod webhook_handler;
pub mod webhook_models;
