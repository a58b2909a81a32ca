use darling::{FromDeriveInput, FromField, FromMeta, ast::Data, util::Ignored};
use proc_macro2::{Ident, TokenStream};
use quote::quote;
use syn::{DeriveInput, Generics, Index, Path, parse_quote};

#[derive(FromMeta)]
struct PathOverrides {
    #[darling(default = "PathOverrides::default_merge")]
    merge: Path,
}
impl Default for PathOverrides {
    fn default() -> Self {
        Self {
            merge: Self::default_merge(),
        }
    }
}
impl PathOverrides {
    fn default_merge() -> Path {
        parse_quote!(::workload_planner::config::merge)
    }
}

#[derive(FromDeriveInput)]
#[darling(
    attributes(merge),
    supports(struct_named, struct_newtype, struct_tuple)
)]
struct MergeInput {
    ident: Ident,
    generics: Generics,
    data: Data<Ignored, MergeField>,
    #[darling(default)]
    path_overrides: PathOverrides,
}

#[derive(FromField)]
struct MergeField {
    ident: Option<Ident>,
}

pub fn derive(input: DeriveInput) -> TokenStream {
    let MergeInput {
        ident,
        generics,
        data,
        path_overrides: PathOverrides { merge: merge_mod },
    } = match MergeInput::from_derive_input(&input) {
        Ok(input) => input,
        Err(err) => return err.write_errors(),
    };
    let Data::Struct(fields) = data else {
        return darling::Error::unsupported_shape("enum").write_errors();
    };

    // Every layer field merges with the same field of the defaults
    let body = fields
        .into_iter()
        .enumerate()
        .map(|(index, MergeField { ident })| {
            let member = match ident {
                Some(ident) => quote! { #ident },
                None => {
                    let index = Index::from(index);
                    quote! { #index }
                }
            };
            quote! {
                #merge_mod::Merge::merge(&mut self.#member, &defaults.#member);
            }
        })
        .collect::<TokenStream>();

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    quote! {
        impl #impl_generics #merge_mod::Merge for #ident #ty_generics #where_clause {
            fn merge(&mut self, defaults: &Self) {
                #body
            }
        }
    }
}
