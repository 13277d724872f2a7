fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // ESP-IDF link arguments are only needed for the firmware image; host
    // builds of the library and tests skip them.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
