//! Protobuf code generation for the query RPC surface.
//!
//! Uses protox to compile the proto descriptors in-process so builds do not
//! require a system protoc install.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let descriptors = protox::compile(["proto/pcapvault/v1/packet.proto"], ["proto"])?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_fds(descriptors)?;

    println!("cargo:rerun-if-changed=proto/pcapvault/v1/packet.proto");
    Ok(())
}
