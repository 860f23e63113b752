use tonic_build::manual::{Builder, Method, Service};

struct ServiceBuilder<'a> {
    package: &'a str,
    name: &'a str,
    /// The Rust module that defines the request and response messages.
    messages: &'a str,
    methods: Vec<(&'a str, &'a str)>,
}

impl<'a> ServiceBuilder<'a> {
    fn new(package: &'a str, name: &'a str, messages: &'a str) -> Self {
        Self {
            package,
            name,
            messages,
            methods: vec![],
        }
    }

    /// Adds a unary method whose messages are `{route}Request` and `{route}Response`.
    fn with_method(mut self, name: &'a str, route: &'a str) -> Self {
        self.methods.push((name, route));
        self
    }

    fn build(self) {
        let service = self
            .methods
            .iter()
            .fold(
                Service::builder().name(self.name).package(self.package),
                |service, (name, route)| {
                    service.method(
                        Method::builder()
                            .name(*name)
                            .route_name(*route)
                            .input_type(format!("{}::{route}Request", self.messages))
                            .output_type(format!("{}::{route}Response", self.messages))
                            .codec_path("tonic::codec::ProstCodec")
                            .build(),
                    )
                },
            )
            .build();
        Builder::new().compile(&[service]);
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    ServiceBuilder::new("drover.worker", "WorkerService", "crate::worker::rpc")
        .with_method("multiples", "Multiples")
        .with_method("stop_worker", "StopWorker")
        .build();
}
