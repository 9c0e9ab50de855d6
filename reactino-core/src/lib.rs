//! Reactino Core
//!
//! This crate provides an incremental reactive computation engine. It
//! implements:
//!
//! - Reactive primitives (cells, pure computations, effects, root effects)
//! - Automatic dependency tracking with pruning of stale dependencies
//! - Glitch-free, rank-ordered batched propagation on a microtask queue
//! - Ownership-based disposal of everything a computation creates
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: The runtime and the typed handles applications use
//! - `graph`: Arena storage for cells and computations, and the scheduler queues
//! - `error`: Structural and application errors
//! - `config`: Runtime configuration and statistics
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use reactino_core::reactive::{ReactiveError, Runtime};
//!
//! let runtime = Runtime::new();
//!
//! // Create a cell
//! let (count, set_count) = runtime.create_cell(0);
//!
//! // Create a derived value
//! let reader = count.clone();
//! let doubled = runtime.create_computation(move || Ok::<_, ReactiveError>(reader.get()? * 2));
//!
//! // Create an effect
//! let printed = Rc::new(RefCell::new(Vec::new()));
//! let sink = printed.clone();
//! let doubled_reader = doubled.clone();
//! let _effect = runtime.create_effect(move || {
//!     sink.borrow_mut().push(format!("Count: {}, Doubled: {}", count.get()?, doubled_reader.get()?));
//!     Ok(None)
//! });
//!
//! // Update the cell, then let the scheduler run
//! set_count.set(5).unwrap();
//! runtime.settle().unwrap();
//! assert_eq!(printed.borrow().last().unwrap(), "Count: 5, Doubled: 10");
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::{RuntimeConfig, RuntimeStats};
pub use error::{ConfigError, ReactiveError};
