#![doc = "resume-uploader-core: workflow logic for re-submitting a resume to a job portal."]

//! This crate holds the whole upload workflow: restoring or re-establishing a
//! portal login, picking the newest resume on disk, driving the portal UI to
//! replace the stored resume, and reporting the outcome.
//!
//! External collaborators (browser, credential store, notifier, operator OTP
//! prompt) sit behind the traits in [`contract`]; concrete adapters live in
//! [`webdriver`], [`credentials`], [`notify`] and [`otp`].
//!
//! # Usage
//! Build a [`config::RunConfig`], a [`session::SessionStore`] and the
//! collaborators, then hand them to [`workflow::WorkflowController`].

pub mod authenticate;
pub mod config;
pub mod contract;
pub mod credentials;
pub mod error;
pub mod notify;
pub mod otp;
pub mod portal;
pub mod resume;
pub mod session;
pub mod upload;
pub mod wait;
pub mod webdriver;
pub mod workflow;
