//! The free functions share one process-wide cache, so everything touching it
//! runs in a single test.

use sniff::ContentType;
use sniff_magic::BUNDLED_DATABASE;
use std::fs;
use std::thread;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR\x00\x00\x00\x10";

#[test]
fn global_cache_follows_database_path() {
    sniff::set_database_path(BUNDLED_DATABASE);
    assert_eq!(sniff::database_path(), std::path::PathBuf::from(BUNDLED_DATABASE));
    assert_eq!(sniff::guess_media_type(PNG).unwrap(), "image/png");
    assert_eq!(sniff::guess_extension(PNG).unwrap(), "png");
    assert_eq!(sniff::guess_content_type(PNG).unwrap().to_string(), "image/png; extension=png");

    let dir = tempfile::tempdir().unwrap();
    let custom = dir.path().join("magic.db");
    fs::write(&custom, "0 string \\x89PNG portable network graphic\n!:mime image/x-png\n!:ext pnm/png\n").unwrap();
    sniff::set_database_path(&custom);
    assert_eq!(sniff::database_path(), custom);

    let from_other_thread = thread::spawn(|| sniff::guess_content_type(PNG).unwrap()).join().unwrap();
    assert_eq!(from_other_thread, ContentType::new("image/x-png", "pnm"));
    assert_eq!(sniff::guess_content_type(PNG).unwrap(), from_other_thread);

    sniff::set_database_path(dir.path().join("missing.db"));
    assert!(sniff::guess_media_type(PNG).is_err());
    sniff::set_database_path(BUNDLED_DATABASE);
    assert_eq!(sniff::guess_media_type(PNG).unwrap(), "image/png");
}
