//! CRD YAML Generator
//!
//! This binary generates the Kubernetes CRD manifest for the MessageRequest
//! custom resource.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/messagerequest.yaml

use message_request_operator::crd::generate_crds;

fn main() -> Result<(), serde_yaml::Error> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
