fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Re-run when the settings contract changes.
    println!("cargo:rerun-if-changed=proto/hypercommons/agent/v1/agent.proto");

    tonic_build::configure()
        // The agent only serves; the host owns the client side.
        .build_client(false)
        .build_server(true)
        .compile(
            &["proto/hypercommons/agent/v1/agent.proto"],
            &["proto"],
        )?;

    Ok(())
}
