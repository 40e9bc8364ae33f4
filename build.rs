// build.rs — Platform detection for sparse-hole support.
//
// Emits `cargo:rustc-cfg=has_hole_punch` on targets where a byte range of an
// existing file can be deallocated in place: Linux via
// fallocate(FALLOC_FL_PUNCH_HOLE) and Windows via
// DeviceIoControl(FSCTL_SET_ZERO_DATA) on a sparse-marked handle.  Everywhere
// else the sparse sink degrades to an explicit zero-fill, which preserves the
// read-back contract but not the on-disk savings.
fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "linux" || target_os == "windows" {
        println!("cargo:rustc-cfg=has_hole_punch");
    }
}
