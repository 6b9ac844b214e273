fn main() {
    // option_env!() values are cached by cargo unless we ask for a rebuild.
    println!("cargo:rerun-if-env-changed=DEVSPARK_SUPABASE_URL");
    println!("cargo:rerun-if-env-changed=DEVSPARK_SUPABASE_ANON_KEY");
    println!("cargo:rerun-if-env-changed=DEVSPARK_SITE_ORIGIN");
}
