mod common;

use common::*;
use hfsutil::ops::{self, DeviceSpec};
use hfsutil::{Action, Device, Error, LegacyUuid, Status};
use std::fs;

fn probe_status(bytes: &[u8]) -> (Status, Vec<u8>) {
    let image = write_image(bytes);
    let mut out = Vec::new();
    let status = with_host(|host| ops::run(host, Action::Probe, &path_arg(&image), &mut out));
    (status, out)
}

#[test]
fn probe_native_volume() {
    let (status, out) = probe_status(&hfs_plus_volume("TestVol", b"H+", Layout::Inline));
    assert_eq!(status, Status::Recognized);
    assert_eq!(out, b"TestVol");
}

#[test]
fn probe_hfsx_volume() {
    let (status, out) = probe_status(&hfs_plus_volume("Case Sensitive", b"HX", Layout::Inline));
    assert_eq!(status, Status::Recognized);
    assert_eq!(out, "Case Sensitive".as_bytes());
}

#[test]
fn probe_wrapped_volume() {
    let (status, out) = probe_status(&wrapped_image("Wrapped"));
    assert_eq!(status, Status::Recognized);
    assert_eq!(out, b"Wrapped");
}

#[test]
fn probe_catalog_with_overflow_extents() {
    let (status, out) = probe_status(&hfs_plus_volume("Overflowed", b"H+", Layout::Overflow));
    assert_eq!(status, Status::Recognized);
    assert_eq!(out, b"Overflowed");
}

#[test]
fn probe_unicode_name() {
    let (status, out) = probe_status(&hfs_plus_volume("Über Disk ☃", b"H+", Layout::Inline));
    assert_eq!(status, Status::Recognized);
    assert_eq!(String::from_utf8(out).unwrap(), "Über Disk ☃");
}

#[test]
fn plain_hfs_is_unrecognized() {
    let (status, out) = probe_status(&plain_hfs_image());
    assert_eq!(status, Status::Unrecognized);
    assert!(out.is_empty());
}

#[test]
fn blank_device_is_unrecognized() {
    let (status, out) = probe_status(&vec![0u8; 8192]);
    assert_eq!(status, Status::Unrecognized);
    assert!(out.is_empty());
}

#[test]
fn damage_after_signature_is_failure() {
    let mut bytes = hfs_plus_volume("TestVol", b"H+", Layout::Inline);
    // Catalog node 0 turned into a leaf.
    bytes[16 * BLOCK + 8] = 0xFF;
    let (status, out) = probe_status(&bytes);
    assert_eq!(status, Status::IoFail);
    assert!(out.is_empty());

    let image = write_image(&bytes);
    let mut device = Device::open(image.path(), false, &hfsutil::Config::default()).unwrap();
    assert!(matches!(
        hfsutil::catalog::volume_name(&mut device),
        Err(Error::Corrupt(_))
    ));
}

#[test]
fn oversized_allocation_block_is_failure() {
    let mut bytes = hfs_plus_volume("TestVol", b"H+", Layout::Inline);
    bytes[1024 + 40..1024 + 44].copy_from_slice(&u32::MAX.to_be_bytes());
    let (status, out) = probe_status(&bytes);
    assert_eq!(status, Status::IoFail);
    assert!(out.is_empty());
}

#[test]
fn empty_catalog_is_failure() {
    let (status, _out) = probe_status(&hfs_plus_volume("", b"H+", Layout::EmptyCatalog));
    assert_eq!(status, Status::IoFail);
}

#[test]
fn truncated_image_is_failure() {
    let bytes = hfs_plus_volume("TestVol", b"H+", Layout::Inline);
    let (status, _out) = probe_status(&bytes[..16 * BLOCK]);
    assert_eq!(status, Status::IoFail);
}

#[test]
fn missing_device_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.img");
    let mut out = Vec::new();
    let status = with_host(|host| ops::run(host, Action::Probe, path.to_str().unwrap(), &mut out));
    assert_eq!(status, Status::IoFail);
}

#[test]
fn set_then_get_uuid() {
    let image = write_image(&hfs_plus_volume("TestVol", b"H+", Layout::Inline));
    let arg = path_arg(&image);

    with_host(|host| {
        let spec = DeviceSpec::parse(&arg, host.config).unwrap();
        ops::set_volume_uuid(host, &spec, LegacyUuid::new(0x12345678, 0x9ABCDEF0)).unwrap();

        let mut out = Vec::new();
        assert_eq!(ops::run(host, Action::GetUuid, &arg, &mut out), Status::IoSuccess);
        assert_eq!(out, b"716C997F-521E-3E98-A5A8-9D23BFDE5BD6");
    });

    let bytes = fs::read(image.path()).unwrap();
    assert_eq!(
        &bytes[1024 + 104..1024 + 112],
        &[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0]
    );

    // The name is still readable after the header was rewritten.
    let (status, out) = probe_status(&bytes);
    assert_eq!(status, Status::Recognized);
    assert_eq!(out, b"TestVol");
}

#[test]
fn unset_uuid_reads_as_nil() {
    let image = write_image(&hfs_plus_volume("TestVol", b"H+", Layout::Inline));
    let mut out = Vec::new();
    let status = with_host(|host| ops::run(host, Action::GetUuid, &path_arg(&image), &mut out));
    assert_eq!(status, Status::IoSuccess);
    assert_eq!(out, b"00000000-0000-0000-0000-000000000000");
}

#[test]
fn change_uuid_in_wrapped_volume() {
    let original = wrapped_image("Wrapped");
    let image = write_image(&original);
    let arg = path_arg(&image);

    let status = with_host(|host| ops::run(host, Action::SetUuid, &arg, &mut Vec::new()));
    assert_eq!(status, Status::IoSuccess);

    let bytes = fs::read(image.path()).unwrap();
    let at = WRAPPED_OFFSET + 1024 + 104;
    let legacy = LegacyUuid::new(
        u32::from_be_bytes(bytes[at..at + 4].try_into().unwrap()),
        u32::from_be_bytes(bytes[at + 4..at + 8].try_into().unwrap()),
    );
    assert!(!legacy.is_unset());

    // Only the embedded header's UUID slot changed.
    assert_eq!(&bytes[..at], &original[..at]);
    assert_eq!(&bytes[at + 8..], &original[at + 8..]);

    let mut out = Vec::new();
    with_host(|host| ops::run(host, Action::GetUuid, &arg, &mut out));
    assert_eq!(
        String::from_utf8(out).unwrap(),
        hfsutil::identity::format_uuid(&legacy.to_full_uuid())
    );
}

#[test]
fn descriptor_cannot_be_written() {
    let status = with_host(|host| ops::run(host, Action::SetUuid, "/dev/fd/0", &mut Vec::new()));
    assert_eq!(status, Status::Invalid);
}
