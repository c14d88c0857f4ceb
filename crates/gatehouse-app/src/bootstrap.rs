//! Process bootstrap: configuration, storage, admin provisioning, and serving.
//!
//! `run_app` reads the environment, installs logging, opens the configured
//! backend, makes sure exactly one administrator credential exists, then
//! hosts the API until a shutdown signal arrives.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use gatehouse_api::{ApiServer, ApiState};
use gatehouse_config::{AdminBootstrap, LogOutput, PortalConfig, SessionTtls, StorageConfig};
use gatehouse_core::{
    AdminGateway, Backends, ExpiryPolicy, Namespace, Portal, SharedClock, SystemClock, memory_backends,
};
use gatehouse_data::{FileBackend, PgBackend};
use gatehouse_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, Metrics};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

/// Dependencies required to boot the portal.
pub(crate) struct BootstrapDependencies {
    config: PortalConfig,
    telemetry: Metrics,
    clock: SharedClock,
}

impl BootstrapDependencies {
    /// Production dependencies read from the process environment.
    pub(crate) fn from_env() -> AppResult<Self> {
        let config =
            PortalConfig::from_env().map_err(|err| AppError::config("config.from_env", err))?;
        Self::new(config)
    }

    pub(crate) fn new(config: PortalConfig) -> AppResult<Self> {
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self {
            config,
            telemetry,
            clock: Arc::new(SystemClock),
        })
    }
}

/// Entry point for the portal boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, logging, storage, credential provisioning,
/// or the API server fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    let logging = &dependencies.config.logging;
    gatehouse_telemetry::init_logging(&LoggingConfig {
        level: &logging.level,
        format: log_format(logging.format),
        build_sha: option_env!("GATEHOUSE_BUILD_SHA").unwrap_or("dev"),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new(dependencies.config.storage.label());

    run_app_with(dependencies, shutdown_signal()).await
}

/// Boot sequence over injected dependencies; returns once `shutdown` resolves
/// and the server has drained.
pub(crate) async fn run_app_with<F>(dependencies: BootstrapDependencies, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let BootstrapDependencies {
        config,
        telemetry,
        clock,
    } = dependencies;
    info!(storage = config.storage.label(), "gatehouse bootstrap starting");

    let backends = open_backends(&config.storage).await?;
    let portal = Portal::assemble(
        backends,
        expiry_policy("member_sessions", config.member_sessions, true)?,
        expiry_policy("admin_sessions", config.admin_sessions, false)?,
        clock,
    );
    provision_admin(&portal.admin, &config.admin).await?;

    let sweeper = config.sweep_interval.map(|period| {
        let metrics = telemetry.clone();
        portal
            .sweeper(period)
            .with_observer(Arc::new(move |namespace: Namespace, reaped: usize| {
                metrics.add_sessions_reaped(namespace.as_str(), reaped);
            }))
            .spawn()
    });
    if sweeper.is_none() {
        info!("background sweep disabled; expiry is enforced on verification only");
    }

    let api = ApiServer::new(ApiState::new(portal, config.http.clone(), telemetry));
    let served = api.serve(config.bind_addr, shutdown).await;

    if let Some(handle) = sweeper {
        handle.stop().await;
    }
    served.map_err(|err| AppError::api_server("api.serve", err))?;
    info!("gatehouse stopped");
    Ok(())
}

pub(crate) async fn open_backends(storage: &StorageConfig) -> AppResult<Backends> {
    match storage {
        StorageConfig::Memory => {
            warn!("memory storage selected; state is lost on restart");
            Ok(memory_backends())
        }
        StorageConfig::File { data_dir } => {
            let backend = FileBackend::open(data_dir)
                .await
                .map_err(|err| AppError::data("file_backend.open", err))?;
            info!(data_dir = %data_dir.display(), "file storage ready");
            Ok(backend.backends())
        }
        StorageConfig::Postgres { database_url } => {
            let backend = PgBackend::connect(database_url)
                .await
                .map_err(|err| AppError::data("pg_backend.connect", err))?;
            info!("postgres storage ready");
            Ok(backend.backends())
        }
    }
}

/// Store the bootstrap credential when none exists yet.
pub(crate) async fn provision_admin(
    admin: &AdminGateway,
    bootstrap: &AdminBootstrap,
) -> AppResult<()> {
    match &bootstrap.password {
        Some(password) => {
            let written = admin
                .ensure_credential(&bootstrap.username, password)
                .await
                .map_err(|err| AppError::portal("admin.ensure_credential", err))?;
            if !written {
                info!("administrator credential already provisioned; bootstrap password ignored");
            }
            Ok(())
        }
        None => {
            let stored = admin
                .has_credential()
                .await
                .map_err(|err| AppError::portal("admin.has_credential", err))?;
            if stored {
                Ok(())
            } else {
                Err(AppError::MissingEnv {
                    name: "GATEHOUSE_ADMIN_PASSWORD",
                })
            }
        }
    }
}

pub(crate) fn expiry_policy(
    field: &'static str,
    ttls: SessionTtls,
    exclusive: bool,
) -> AppResult<ExpiryPolicy> {
    let convert = |value: Duration| {
        ChronoDuration::from_std(value).map_err(|_| AppError::InvalidConfig {
            field,
            reason: "ttl out of range",
        })
    };
    Ok(ExpiryPolicy {
        absolute_ttl: convert(ttls.absolute)?,
        idle_ttl: ttls.idle.map(convert).transpose()?,
        exclusive,
    })
}

pub(crate) const fn log_format(output: Option<LogOutput>) -> LogFormat {
    match output {
        Some(LogOutput::Json) => LogFormat::Json,
        Some(LogOutput::Pretty) => LogFormat::Pretty,
        None => LogFormat::infer(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("ctrl-c received; shutting down"),
        () = terminate => info!("SIGTERM received; shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use gatehouse_config::{HttpSettings, LogSettings};
    use gatehouse_core::GateError;
    use std::net::SocketAddr;

    fn config(storage: StorageConfig, password: Option<&str>) -> PortalConfig {
        PortalConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            storage,
            admin: AdminBootstrap {
                username: "admin".into(),
                password: password.map(str::to_string),
            },
            member_sessions: SessionTtls {
                absolute: Duration::from_secs(86_400),
                idle: Some(Duration::from_secs(1_800)),
            },
            admin_sessions: SessionTtls {
                absolute: Duration::from_secs(43_200),
                idle: None,
            },
            sweep_interval: Some(Duration::from_millis(10)),
            http: HttpSettings {
                cookie_secure: false,
                country_header: "cf-ipcountry".into(),
            },
            logging: LogSettings {
                level: "info".into(),
                format: None,
            },
        }
    }

    #[test]
    fn ttls_convert_to_policies() -> Result<()> {
        let policy = expiry_policy(
            "member_sessions",
            SessionTtls {
                absolute: Duration::from_secs(86_400),
                idle: Some(Duration::from_secs(1_800)),
            },
            true,
        )?;
        assert_eq!(policy, ExpiryPolicy::member_default());

        let admin = expiry_policy(
            "admin_sessions",
            SessionTtls {
                absolute: Duration::from_secs(60),
                idle: None,
            },
            false,
        )?;
        assert!(admin.idle_ttl.is_none());
        assert!(!admin.exclusive);

        let err = expiry_policy(
            "member_sessions",
            SessionTtls {
                absolute: Duration::MAX,
                idle: None,
            },
            true,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidConfig {
                field: "member_sessions",
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn log_format_honours_explicit_choice() {
        assert_eq!(log_format(Some(LogOutput::Json)), LogFormat::Json);
        assert_eq!(log_format(Some(LogOutput::Pretty)), LogFormat::Pretty);
        assert_eq!(log_format(None), LogFormat::infer());
    }

    #[tokio::test]
    async fn missing_password_without_stored_credential_fails() -> Result<()> {
        let dependencies = BootstrapDependencies::new(config(StorageConfig::Memory, None))?;
        let err = run_app_with(dependencies, async {}).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::MissingEnv {
                name: "GATEHOUSE_ADMIN_PASSWORD"
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn stored_credential_survives_restart_without_password() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = StorageConfig::File {
            data_dir: dir.path().to_path_buf(),
        };

        let first = BootstrapDependencies::new(config(storage.clone(), Some("s3cret")))?;
        run_app_with(first, async {}).await?;

        let second = BootstrapDependencies::new(config(storage.clone(), None))?;
        run_app_with(second, async {}).await?;

        let backends = open_backends(&storage).await?;
        let portal = Portal::assemble(
            backends,
            ExpiryPolicy::member_default(),
            ExpiryPolicy::admin_default(),
            Arc::new(SystemClock),
        );
        assert!(portal.admin.authenticate("admin", "s3cret").await.is_ok());
        assert!(matches!(
            portal.admin.authenticate("admin", "other").await,
            Err(GateError::BadCredentials)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn provisioning_keeps_the_first_credential() -> Result<()> {
        let portal = Portal::assemble(
            memory_backends(),
            ExpiryPolicy::member_default(),
            ExpiryPolicy::admin_default(),
            Arc::new(SystemClock),
        );
        let first = AdminBootstrap {
            username: "admin".into(),
            password: Some("first".into()),
        };
        let second = AdminBootstrap {
            username: "admin".into(),
            password: Some("second".into()),
        };
        provision_admin(&portal.admin, &first).await?;
        provision_admin(&portal.admin, &second).await?;
        assert!(portal.admin.authenticate("admin", "first").await.is_ok());
        Ok(())
    }
}
