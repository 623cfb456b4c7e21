//! Derive macro for [`ez80_object`]'s `Read` trait on fieldless, `repr(u8)`
//! enums, such as the object format's section and symbol-flag tags.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse, Attribute, Data, DataEnum, DeriveInput, Generics, Ident};

#[proc_macro_derive(Read)]
pub fn derive_enum_read(input: TokenStream) -> TokenStream {
    let derive_input: DeriveInput = parse(input).unwrap();

    match derive_input.data {
        Data::Enum(ref enum_data) => derive_enum_read_impl(
            &derive_input.ident,
            enum_data,
            &derive_input.generics,
            fetch_repr(&derive_input.attrs),
        ),
        Data::Struct(_) | Data::Union(_) => {
            panic!("`Read` cannot be derived onto `struct` or `union`")
        }
    }
}

fn derive_enum_read_impl(
    enum_name: &Ident,
    data: &DataEnum,
    generics: &Generics,
    repr: Option<Ident>,
) -> TokenStream {
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let repr = repr.expect("A `#[repr(…)]` attribute must be present");

    if repr != "u8" {
        panic!("`Read` only handles the `u8` representation so far");
    }

    let (parser_logic, variants): (Vec<_>, Vec<_>) = data
        .variants
        .iter()
        .map(|variant| {
            let name = &variant.ident;
            let discriminant = match &variant.discriminant {
                Some((_, syn::Expr::Lit(syn::ExprLit { lit: syn::Lit::Int(int), .. }))) => int,
                _ => panic!(
                    "All variants must have a discriminant, and it must represent an integer"
                ),
            };

            (
                quote! {
                    #discriminant => Self::#name
                },
                quote! {
                    #name
                },
            )
        })
        .unzip();

    let test_name = proc_macro2::Ident::new(
        &format!("test_{}", enum_name.to_string().to_lowercase()),
        proc_macro2::Span::call_site(),
    );

    quote! {
        impl #impl_generics #enum_name #ty_generics
        #where_clause
        {
            pub fn read<'a, E>(input: crate::Input<'a>) -> crate::Result<'a, Self, E>
            where
                E: ::nom::error::ParseError<crate::Input<'a>>,
            {
                let (input, discriminant) = ::nom::number::complete::u8::<_, E>(input)?;

                Ok((
                    input,
                    match discriminant {
                        #( #parser_logic, )*
                        _ => return Err(::nom::Err::Error(E::from_error_kind(input, ::nom::error::ErrorKind::Alt))),
                    }
                ))
            }
        }

        #[cfg(test)]
        #[test]
        fn #test_name() {
            #(
                {
                    let input: u8 = #enum_name::#variants as _;

                    assert_eq!(
                        #enum_name::read::<()>(&[input]),
                        Ok((&[] as &[u8], #enum_name::#variants))
                    );
                }
            )*
        }
    }
    .into()
}

fn fetch_repr(attrs: &[Attribute]) -> Option<Ident> {
    attrs.iter().find_map(|attr| {
        if !attr.path().is_ident("repr") {
            return None;
        }

        let mut found = None;

        attr.parse_nested_meta(|meta| {
            found = meta.path.get_ident().cloned();
            Ok(())
        })
        .ok()?;

        found
    })
}
