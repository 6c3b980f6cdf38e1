fn main() {
    println!("cargo:rustc-link-lib=dylib=ibverbs");
    println!("cargo:rustc-link-lib=dylib=rdmacm");

    // re-run build.rs upon changes
    println!("cargo:rerun-if-changed=build.rs");
}
