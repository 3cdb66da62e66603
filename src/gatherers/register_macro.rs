macro_rules! register_gatherers {
    (
        $(
            $kind:ident => $module:ident :: $gatherer:ident
        ),* $(,)?
    ) => {
        $(
            pub mod $module;
            pub use $module::$gatherer;
        )*

        /// The fixed set of gatherers a host can run, one variant per metric kind.
        pub enum GathererType<B: Backend> {
            $(
                $kind($gatherer<B>),
            )*
        }

        impl<B: Backend> GathererType<B> {
            /// Build the gatherer for `kind`, bound to `target`.
            #[must_use]
            pub fn new(
                kind: MetricKind,
                target: Arc<HostTarget>,
                backend: Arc<B>,
                registry: GathererRegistry,
            ) -> Self {
                match kind {
                    $(
                        MetricKind::$kind => Self::$kind($gatherer::new(target, backend, registry)),
                    )*
                }
            }
        }

        impl<B: Backend> Gatherer for GathererType<B> {
            fn kind(&self) -> MetricKind {
                match self {
                    $(
                        Self::$kind(g) => g.kind(),
                    )*
                }
            }

            async fn gather_data(&mut self) -> bool {
                match self {
                    $(
                        Self::$kind(g) => g.gather_data().await,
                    )*
                }
            }
        }
    };
}
