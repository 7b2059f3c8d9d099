use proc_macro::TokenStream;

mod injectable;

/// Derive macro implementing `switchyard::Injectable`.
///
/// Every `Arc<T>` field is resolved from the container (`T` may be a `dyn Trait` bound
/// in the metadata store). Any other field is filled with `Default::default()`.
///
/// # Example
/// ```ignore
/// use switchyard::DeriveInjectable;
/// use std::sync::Arc;
///
/// #[derive(DeriveInjectable)]
/// pub struct UserService {
///     repository: Arc<dyn UserRepository>,
///     retries: u32,
/// }
/// ```
#[proc_macro_derive(Injectable)]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    injectable::derive_injectable(input)
}
