// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prepaid session packages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use tressa_core::{Clock, PackageStatus, TressaError};
use tressa_storage::queries::packages;
use tressa_storage::{Database, UserPackage, begin_write};

use crate::recording;

enum Consumption {
    Consumed(UserPackage),
    ExpiredNow,
    Refused(TressaError),
}

/// Sells and consumes session packages.
pub struct PackageService {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl PackageService {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Create an active package of `total_sessions` valid until `valid_until`.
    pub async fn create_package(
        &self,
        user_id: &str,
        name: &str,
        total_sessions: i64,
        valid_until: DateTime<Utc>,
    ) -> Result<UserPackage, TressaError> {
        let now = self.clock.now();
        if user_id.trim().is_empty() || name.trim().is_empty() {
            return Err(TressaError::InvalidConfig(
                "package user and name must not be empty".to_string(),
            ));
        }
        if total_sessions <= 0 {
            return Err(TressaError::InvalidConfig(format!(
                "a package needs at least one session, got {total_sessions}"
            )));
        }
        if valid_until <= now {
            return Err(TressaError::InvalidConfig(
                "package validity must end in the future".to_string(),
            ));
        }
        let package = UserPackage {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.trim().to_string(),
            total_sessions,
            sessions_used: 0,
            valid_until,
            status: PackageStatus::Active,
            created_at: now,
            updated_at: now,
        };
        packages::insert_package(&self.db, &package).await?;
        info!(package_id = %package.id, user_id, total_sessions, "package created");
        Ok(package)
    }

    /// Use one session.
    ///
    /// `NotFound` for an unknown package or one owned by someone else;
    /// `Expired` when validity has lapsed (the package is flipped to
    /// `expired`); `NotActive` when the package is exhausted or already expired.
    pub async fn consume_session(
        &self,
        package_id: &str,
        user_id: &str,
    ) -> Result<UserPackage, TressaError> {
        let now = self.clock.now();
        let package_id_owned = package_id.to_string();
        let user = user_id.to_string();

        let outcome = self
            .db
            .write(move |conn| {
                let tx = begin_write(conn)?;
                let outcome = match packages::consume_one(&tx, &package_id_owned, &user, &now)? {
                    Some(package) => Consumption::Consumed(package),
                    None => match packages::by_id(&tx, &package_id_owned)? {
                        Some(p) if p.user_id != user => Consumption::Refused(
                            TressaError::not_found("package", package_id_owned.clone()),
                        ),
                        None => Consumption::Refused(TressaError::not_found(
                            "package",
                            package_id_owned.clone(),
                        )),
                        Some(p) => {
                            if packages::expire_if_overdue(&tx, &p.id, &now)? == 1 {
                                Consumption::ExpiredNow
                            } else {
                                Consumption::Refused(TressaError::NotActive {
                                    id: p.id,
                                    status: p.status.to_string(),
                                })
                            }
                        }
                    },
                };
                tx.commit()?;
                Ok(outcome)
            })
            .await?;

        match outcome {
            Consumption::Consumed(package) => {
                info!(
                    package_id = %package.id,
                    user_id = %package.user_id,
                    remaining = package.sessions_remaining(),
                    status = %package.status,
                    "package session consumed"
                );
                Ok(package)
            }
            Consumption::ExpiredNow => {
                recording::record_packages_expired(1);
                info!(package_id, "package expired at consumption");
                Err(TressaError::Expired {
                    id: package_id.to_string(),
                })
            }
            Consumption::Refused(err) => Err(err),
        }
    }

    pub async fn get_package(&self, package_id: &str) -> Result<Option<UserPackage>, TressaError> {
        packages::get_package(&self.db, package_id).await
    }

    /// A user's packages, newest first.
    pub async fn packages_for_user(&self, user_id: &str) -> Result<Vec<UserPackage>, TressaError> {
        packages::list_for_user(&self.db, user_id).await
    }
}
