use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Type, parse_macro_input};

pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match generate_injectable_impl(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

fn generate_injectable_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            struct_name,
            "#[derive(Injectable)] can only be applied to structs",
        ));
    };

    let mut dependencies = Vec::new();
    let construct = match &data.fields {
        Fields::Named(fields) => {
            let values = fields.named.iter().map(|field| {
                let field_name = &field.ident;
                let value = field_value(&field.ty, &mut dependencies);
                quote!(#field_name: #value)
            });
            let values: Vec<_> = values.collect();
            quote!(Self { #(#values),* })
        }
        Fields::Unnamed(fields) => {
            let values: Vec<_> = fields
                .unnamed
                .iter()
                .map(|field| field_value(&field.ty, &mut dependencies))
                .collect();
            quote!(Self(#(#values),*))
        }
        Fields::Unit => quote!(Self),
    };

    Ok(quote! {
        impl #impl_generics ::switchyard::Injectable for #struct_name #ty_generics #where_clause {
            fn inject(
                container: &::switchyard::Container
            ) -> ::switchyard::Result<Self> {
                Ok(#construct)
            }

            fn dependencies() -> ::std::vec::Vec<::switchyard::TypeKey> {
                ::std::vec![#(::switchyard::TypeKey::of::<#dependencies>()),*]
            }
        }
    })
}

/// Expression filling a field, recording resolved types in `dependencies`.
fn field_value(ty: &Type, dependencies: &mut Vec<Type>) -> TokenStream2 {
    match arc_inner_type(ty) {
        Some(inner) => {
            let expr = quote!(container.resolve::<#inner>()?);
            dependencies.push(inner);
            expr
        }
        None => quote!(::std::default::Default::default()),
    }
}

/// Extract the inner type from Arc<T> or Arc<dyn Trait>
fn arc_inner_type(ty: &Type) -> Option<Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Arc" {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        syn::GenericArgument::Type(inner_type) => Some(inner_type.clone()),
        _ => None,
    }
}
