//! Purpose: Disk-backed, schema-typed row store library used by the `rowstore` CLI and tests.
//! Exports: `api` (stable facade), `core` (format, read engine, writer, derivations).
//! Role: Library backing the binary; `api` is the supported import path.
//! Invariants: Tables are immutable once built; new data always flows through a writer.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
