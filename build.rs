use dotenvy::dotenv_iter;
use embuild::espidf;

fn main() {
    bake_dotenv();
    espidf::sysenv::output();
}

/// Forwards `.env` key/value pairs to the compiler as `rustc-env` entries.
///
/// The target has no filesystem to read configuration from at runtime, so
/// server address, device id and profile selection are baked into the image
/// at build time and picked up in `config.rs` via `option_env!`. Missing keys
/// fall back to the defaults declared there, so a `.env` file is optional.
fn bake_dotenv() {
    println!("cargo:rerun-if-changed=.env");

    if let Ok(iter) = dotenv_iter() {
        for item in iter {
            let (key, value) = item.expect("Failed to read .env element");
            println!("cargo:rustc-env={}={}", key, value);
        }
    }
}
