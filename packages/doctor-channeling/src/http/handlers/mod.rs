pub mod accounts;
pub mod admin;
pub mod appointments;
pub mod directory;
pub mod patients;
pub mod public;

use super::ApiResponse;
use crate::error::Error;

type ApiResult = Result<ApiResponse, Error>;
