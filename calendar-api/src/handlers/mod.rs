// SPDX-License-Identifier: Apache-2.0
mod api;
mod health;

pub use api::api_router;
pub use health::health;
