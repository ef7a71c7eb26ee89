// SPDX-License-Identifier: CC-BY-NC-ND-4.0

use flate2::Compression;
use flate2::write::GzEncoder;
use mockito::Server;
use raiden_client::release::ASSET_SUFFIX;
use raiden_client::{
    ClientConfig, ClientError, ClientLauncher, Installer, NightlySource, ReleaseCatalog,
    ReleaseChannel,
};
use serde_json::json;
use std::io::{Cursor, Write};
use std::time::Duration;

const PAYLOAD: &[u8] = b"raiden node binary";

fn archive() -> Vec<u8> {
    if ASSET_SUFFIX.ends_with(".gz") {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_size(PAYLOAD.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, "raiden", PAYLOAD).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    } else {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("raiden", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(PAYLOAD).unwrap();
        writer.finish().unwrap().into_inner()
    }
}

#[tokio::test]
async fn test_latest_stable_release_installs() {
    let mut server = Server::new_async().await;
    let download = |tag: &str| format!("{}/download/raiden-{tag}-{ASSET_SUFFIX}", server.url());
    let releases = json!([
        {
            "tag_name": "v1.1.0",
            "assets": [{
                "name": format!("raiden-v1.1.0-{ASSET_SUFFIX}"),
                "browser_download_url": download("v1.1.0"),
            }]
        },
        {
            "tag_name": "v1.2.0",
            "assets": [
                {
                    "name": format!("raiden-v1.2.0-{ASSET_SUFFIX}.asc"),
                    "browser_download_url": download("v1.2.0") + ".asc",
                },
                {
                    "name": format!("raiden-v1.2.0-{ASSET_SUFFIX}"),
                    "browser_download_url": download("v1.2.0"),
                }
            ]
        },
        {
            "tag_name": "v1.3.0rc1",
            "assets": [{
                "name": format!("raiden-v1.3.0rc1-{ASSET_SUFFIX}"),
                "browser_download_url": download("v1.3.0rc1"),
            }]
        }
    ]);

    let _list = server
        .mock("GET", "/repos/raiden-network/raiden/releases")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(releases.to_string())
        .create_async()
        .await;
    let artifact = server
        .mock("GET", format!("/download/raiden-v1.2.0-{ASSET_SUFFIX}").as_str())
        .with_status(200)
        .with_body(archive())
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig {
        github_api_url: server.url(),
        binary_dir: dir.path().join("bin"),
        ..ClientConfig::default()
    };
    let launcher = ClientLauncher::new(config).unwrap();

    let release = launcher.resolve().await.unwrap();
    assert_eq!(release.release(), "1.2.0");
    assert_eq!(release.display_version(), "Raiden 1.2.0");

    let installed = launcher.ensure_installed(&release).await.unwrap();
    assert_eq!(installed, dir.path().join("bin").join("raiden-1.2.0"));
    assert_eq!(std::fs::read(&installed).unwrap(), PAYLOAD);

    // Already present, so no second download.
    launcher.ensure_installed(&release).await.unwrap();
    artifact.assert_async().await;

    let installer = Installer::new(Duration::from_secs(5)).unwrap();
    let again = installer.install(&release, &dir.path().join("bin"), false).await;
    assert!(matches!(again, Err(ClientError::AlreadyInstalled(_))));
}

#[tokio::test]
async fn test_newest_nightly_build_installs() {
    let mut server = Server::new_async().await;
    let key = |stamp: &str| format!("NIGHTLY/raiden-nightly-{stamp}-v0.200.0rc1-{ASSET_SUFFIX}");
    let contents: String = ["2020-01-09T00-15-01", "2020-01-10T00-15-01"]
        .iter()
        .map(|stamp| format!("<Contents><Key>{}</Key></Contents>", key(stamp)))
        .collect();

    let _index = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(format!("<ListBucketResult>{contents}</ListBucketResult>"))
        .create_async()
        .await;
    let _artifact = server
        .mock("GET", format!("/{}", key("2020-01-10T00-15-01")).as_str())
        .with_status(200)
        .with_body(archive())
        .create_async()
        .await;

    let catalog = ReleaseCatalog::new(Box::new(NightlySource::new(
        &server.url(),
        reqwest::Client::new(),
    )));
    assert_eq!(catalog.channel(), ReleaseChannel::Nightly);

    let latest = catalog.latest().await.unwrap();
    assert_eq!(latest.release(), "0.200.0rc1-20200110");

    let dir = tempfile::tempdir().unwrap();
    let installed = Installer::new(Duration::from_secs(5))
        .unwrap()
        .install(&latest, dir.path(), false)
        .await
        .unwrap();
    assert_eq!(
        installed.file_name().unwrap(),
        "raiden-nightly-0.200.0rc1-20200110"
    );
    assert_eq!(std::fs::read(installed).unwrap(), PAYLOAD);
}
