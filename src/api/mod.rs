// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod detect;
pub mod errors;
pub mod handlers;
pub mod http_server;

pub use detect::{detect_handler, DETECTIONS_HEADER, IMAGE_ORIGIN_HEADER, REQUEST_ID_HEADER};
pub use errors::{ApiError, ApiErrorResponse, ErrorResponse};
pub use handlers::{DetectorHealth, EnhancerHealth, HealthResponse};
pub use http_server::{build_router, start_server, AppState};
