/*
 *  Pheme - Discord bot for tallying and rewarding community activity.
 *  Copyright (C) 2025  Manuel de Castro
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use crate::dashboard::error::ApiError;
use crate::Data;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use subtle::ConstantTimeEq;

/**
 * Proof that the request carried `Authorization: Bearer <DASHBOARD_SECRET>`. Add it as the first
 * extractor of every mutating handler.
 */
pub struct Authorized;

#[async_trait]
impl FromRequestParts<Data> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, data: &Data) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized("missing bearer token"))?;

        // Exact match, in time independent of where the first difference is:
        let valid: bool = token
            .as_bytes()
            .ct_eq(data.config.dashboard_secret.as_bytes())
            .into();
        if valid {
            Ok(Authorized)
        } else {
            Err(ApiError::Unauthorized("invalid bearer token"))
        }
    }
}
