//! Generated gRPC types and traits for the `Tunnel` service, built from
//! `proto/tunnel.proto` by `tonic-build` (see `build.rs`).
//!
//! Everything in [`tunnel`] is produced code; the core never constructs the
//! wire representation by hand, only the `RequestFrame`/`ResponseFrame`
//! message types it carries.

pub mod tunnel {
    tonic::include_proto!("tunnel");
}
