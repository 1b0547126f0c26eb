mod common;

use common::{ScriptedDevice, ScriptedTransport};
use disksurvey_core::DiskClass;
use disksurvey_monitor::{inquiry, DeviceLister, ScanError, SgDirLister};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sas_device_is_classified_from_inquiry_alone() {
    let transport = ScriptedTransport::new();
    transport.set_device("/dev/sg0", ScriptedDevice::sas("SEAGATE", "S1"));

    let info = inquiry(transport.as_ref(), "/dev/sg0", 1000).await.unwrap();
    assert_eq!(info.vendor, "SEAGATE");
    assert_eq!(info.model, "ST2000NM0001");
    assert_eq!(info.serial, "S1");
    assert_eq!(info.fw_rev, "0002");
    assert_eq!(info.device_type, 0);
    assert!(matches!(info.class, DiskClass::Sas(_)));
    assert!(info.smart_healthy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bridged_ata_device_is_refined_via_identify() {
    let transport = ScriptedTransport::new();
    transport.set_device("/dev/sg1", ScriptedDevice::ata("WD-WMC5D0D4YY1K"));

    let info = inquiry(transport.as_ref(), "/dev/sg1", 1000).await.unwrap();
    // Vendor/model come from the IDENTIFY model string, split on the first
    // space; serial and firmware come from their identify words.
    assert_eq!(info.vendor, "WDC");
    assert_eq!(info.model, "WD4003FZEX-00Z4SA0");
    assert_eq!(info.serial, "WD-WMC5D0D4YY1K");
    assert_eq!(info.fw_rev, "01.01A01");
    match info.class {
        DiskClass::Ata(ata) => {
            assert!(ata.smart_supported);
            assert!(ata.smart_ok, "health defaults to ok until measured");
        }
        other => panic!("expected ATA classification, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_device_is_a_scan_error() {
    let transport = ScriptedTransport::new();
    let err = inquiry(transport.as_ref(), "/dev/sg9", 1000).await.unwrap_err();
    assert!(matches!(err, ScanError::Transport(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dir_lister_picks_only_sg_nodes() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["sg0", "sg1", "sg12", "sda", "sgx", "sg", "nvme0n1"] {
        std::fs::write(dir.path().join(name), b"").unwrap();
    }

    let lister = SgDirLister::new(dir.path());
    let paths = lister.list().await.unwrap();
    let names: Vec<_> = paths
        .iter()
        .map(|p| p.rsplit('/').next().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["sg0", "sg1", "sg12"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dir_lister_reports_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let lister = SgDirLister::new(dir.path().join("absent"));
    assert!(lister.list().await.is_err());
}
