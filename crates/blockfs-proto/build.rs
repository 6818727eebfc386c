// Build script to compile protobuf files into Rust code.
//
// Generates the name-service and block-service message types and
// client/server stubs from the .proto files in the proto/ directory.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::compile_protos("proto/nameservice.proto")?;
    tonic_build::compile_protos("proto/blockservice.proto")?;

    Ok(())
}
