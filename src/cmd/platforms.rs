use fixembed::Registry;

pub fn cmd_platforms() {
    let registry = Registry::new();
    println!("📋 {} platforms (dispatch order)\n", registry.len());
    for platform in registry.platforms() {
        println!(
            "   {:<10} {:<14} {}",
            platform.as_str(),
            platform.label(),
            platform.color()
        );
    }
}
