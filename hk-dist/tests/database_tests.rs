//! Database integration tests
//!
//! These tests require a running PostgreSQL database.

mod common;

use common::{TestResult, create_test_manager, linux, release, test_database_config, wait_for_database};
use hk_dist::database::{DatabaseConnection, PatchEdge};
use serial_test::serial;

fn edge(oldver: &str, newver: &str) -> PatchEdge {
    PatchEdge {
        plat: linux(),
        cmd: "hk".to_string(),
        oldver: oldver.to_string(),
        newver: newver.to_string(),
    }
}

#[tokio::test]
#[serial]
async fn test_database_connection() -> TestResult {
    wait_for_database().await?;

    let connection = DatabaseConnection::new(&test_database_config()).await?;
    assert!(connection.health_check().await);

    // Creating the schema twice is harmless
    connection.ensure_schema().await?;
    connection.ensure_schema().await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_duplicate_registration_conflicts() -> TestResult {
    let manager = create_test_manager().await?;
    let plat = linux();

    let before = manager.last_modified().await?;
    manager.register_release(&release(&plat, "hk", "1")).await?;
    assert!(manager.last_modified().await? >= before);

    let err = manager
        .register_release(&release(&plat, "hk", "1"))
        .await
        .unwrap_err();
    assert!(err.is_duplicate());

    // Same version on another platform is a different release
    let darwin = "darwin-amd64".parse()?;
    manager.register_release(&release(&darwin, "hk", "1")).await?;

    let hash = manager.release_hash(&plat, "hk", "1").await?;
    assert_eq!(hash, Some(vec![b'1'; 32]));
    assert_eq!(manager.release_hash(&plat, "hk", "2").await?, None);
    assert_eq!(manager.list_releases().await?.len(), 2);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_current_upsert() -> TestResult {
    let manager = create_test_manager().await?;
    let plat = linux();
    manager.register_release(&release(&plat, "hk", "1")).await?;
    manager.register_release(&release(&plat, "hk", "2")).await?;

    assert!(manager.current_info(&plat, "hk").await?.is_none());

    manager.set_current(&plat, "hk", "1").await?;
    let info = manager.current_info(&plat, "hk").await?.unwrap();
    assert_eq!(info.version, "1");

    manager.set_current(&plat, "hk", "2").await?;
    let info = manager.current_info(&plat, "hk").await?.unwrap();
    assert_eq!(info.version, "2");
    assert_eq!(info.sha256, vec![b'2'; 32]);

    let err = manager.set_current(&plat, "hk", "9").await.unwrap_err();
    assert!(err.is_not_found());
    let info = manager.current_info(&plat, "hk").await?.unwrap();
    assert_eq!(info.version, "2");
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_pending_edges_and_converge() -> TestResult {
    let manager = create_test_manager().await?;
    let plat = linux();
    for ver in ["1", "2", "3"] {
        manager.register_release(&release(&plat, "hk", ver)).await?;
    }

    // Nothing is pending without a current version
    assert!(manager.pending_edges().await?.is_empty());

    manager.set_current(&plat, "hk", "2").await?;
    assert_eq!(manager.pending_edges().await?, vec![edge("1", "2"), edge("3", "2")]);

    manager.create_patch(&edge("1", "2"), "aa").await?;
    assert!(manager.patch_exists(&edge("1", "2")).await?);
    assert_eq!(manager.pending_edges().await?, vec![edge("3", "2")]);

    let err = manager.create_patch(&edge("1", "2"), "aa").await.unwrap_err();
    assert!(err.is_duplicate());

    let stats = manager.converge().await?;
    assert_eq!(stats.inserted, 1);
    let next = manager.next_patch(&plat, "hk", "1").await?.unwrap();
    assert_eq!(next.version, "2");
    assert_eq!(next.sha1, "aa");
    assert!(manager.next_patch(&plat, "hk", "3").await?.is_none());

    // Converging again changes nothing
    let stats = manager.converge().await?;
    assert_eq!((stats.deleted, stats.inserted, stats.updated), (0, 0, 0));

    // Moving current to 3 repoints 1 and drops the row leaving 3
    manager.set_current(&plat, "hk", "3").await?;
    manager.create_patch(&edge("1", "3"), "bb").await?;
    manager.create_patch(&edge("2", "3"), "cc").await?;
    let stats = manager.converge().await?;
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.inserted, 1);

    let next = manager.next_patch(&plat, "hk", "1").await?.unwrap();
    assert_eq!((next.version.as_str(), next.sha1.as_str()), ("3", "bb"));
    let next = manager.next_patch(&plat, "hk", "2").await?.unwrap();
    assert_eq!((next.version.as_str(), next.sha1.as_str()), ("3", "cc"));
    assert!(manager.next_patch(&plat, "hk", "3").await?.is_none());
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_converge_deletes_row_from_current() -> TestResult {
    let manager = create_test_manager().await?;
    let plat = linux();
    for ver in ["1", "2"] {
        manager.register_release(&release(&plat, "hk", ver)).await?;
    }

    manager.set_current(&plat, "hk", "2").await?;
    manager.create_patch(&edge("1", "2"), "aa").await?;
    manager.converge().await?;

    // Rolling back makes the old version current again
    manager.set_current(&plat, "hk", "1").await?;
    let stats = manager.converge().await?;
    assert_eq!(stats.deleted, 1);
    assert!(manager.next_patch(&plat, "hk", "1").await?.is_none());
    Ok(())
}
