use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use mmd_common::Error;
use tracing::{error, info, warn};

/// §4.J / §6.5: succeeds iff `root_dir` exists, is a directory, and is
/// writable. Writability is checked by actually creating and removing a
/// probe file, since permission bits alone can be misleading under some
/// filesystems (overlayfs, network mounts).
pub async fn check_root_dir(root_dir: &Path) -> Result<(), Error> {
    let meta = tokio::fs::metadata(root_dir)
        .await
        .map_err(|err| Error::UserInputError(format!("rootDir {}: {err}", root_dir.display())))?;
    if !meta.is_dir() {
        return Err(Error::UserInputError(format!("rootDir {} is not a directory", root_dir.display())));
    }

    let probe = root_dir.join(format!(".health-probe-{}", std::process::id()));
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|err| Error::UserInputError(format!("rootDir {} is not writable: {err}", root_dir.display())))?;
    let _ = tokio::fs::remove_file(&probe).await;
    Ok(())
}

/// Serves `/healthz` on `addr` until the process exits, re-running the
/// probe on every request rather than caching the startup result.
pub async fn serve(root_dir: Arc<std::path::PathBuf>, addr: SocketAddr) {
    let make_svc = make_service_fn(move |_conn| {
        let root_dir = root_dir.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let root_dir = root_dir.clone();
                async move {
                    if req.uri().path() != "/healthz" {
                        return Ok::<_, Infallible>(Response::builder().status(404).body(Body::empty()).unwrap());
                    }
                    match check_root_dir(&root_dir).await {
                        Ok(()) => Ok(Response::new(Body::from("ok"))),
                        Err(err) => {
                            warn!(error = %err, "health probe failing");
                            Ok(Response::builder().status(503).body(Body::from(err.to_string())).unwrap())
                        }
                    }
                }
            }))
        }
    });

    info!(%addr, "serving health probe");
    if let Err(err) = Server::bind(&addr).serve(make_svc).await {
        error!(error = %err, "health server exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writable_directory_passes() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_root_dir(dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(check_root_dir(&missing).await.is_err());
    }

    #[tokio::test]
    async fn file_instead_of_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("not-a-dir");
        tokio::fs::write(&file_path, b"x").await.unwrap();
        assert!(check_root_dir(&file_path).await.is_err());
    }
}
