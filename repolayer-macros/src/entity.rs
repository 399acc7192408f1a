use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Error, Fields, Ident, LitStr, Result};

pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input: DeriveInput = match syn::parse2(input) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };

    match expand(&input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error(),
    }
}

#[derive(Default)]
struct FieldRoles {
    id: bool,
    tracker: bool,
}

fn container_collection(attrs: &[Attribute]) -> Result<Option<LitStr>> {
    let mut collection = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                collection = Some(meta.value()?.parse::<LitStr>()?);
                Ok(())
            } else {
                Err(meta.error("expected `collection = \"...\"`"))
            }
        })?;
    }

    Ok(collection)
}

fn field_roles(attrs: &[Attribute]) -> Result<FieldRoles> {
    let mut roles = FieldRoles::default();

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                roles.id = true;
                Ok(())
            } else if meta.path.is_ident("tracker") {
                roles.tracker = true;
                Ok(())
            } else {
                Err(meta.error("expected `id` or `tracker`"))
            }
        })?;
    }

    Ok(roles)
}

/// Picks the field marked with the role, falling back to the field with the conventional name.
fn pick<'a>(
    marked: Vec<&'a Ident>,
    named: Option<&'a Ident>,
    role: &str,
    input: &DeriveInput,
) -> Result<&'a Ident> {
    match marked.as_slice() {
        [field] => Ok(*field),
        [] => named.ok_or_else(|| {
            Error::new_spanned(
                &input.ident,
                format!("Entity requires a field named `{role}` or marked `#[entity({role})]`"),
            )
        }),
        [_, second, ..] => Err(Error::new_spanned(
            second,
            format!("only one field may be marked `#[entity({role})]`"),
        )),
    }
}

fn expand(input: &DeriveInput) -> Result<TokenStream> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            other => {
                return Err(Error::new_spanned(
                    other,
                    "Entity can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(Error::new_spanned(
                ident,
                "Entity can only be derived for structs with named fields",
            ));
        }
    };

    let mut marked_id = Vec::new();
    let mut marked_tracker = Vec::new();
    let mut named_id = None;
    let mut named_tracker = None;

    for field in fields {
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let roles = field_roles(&field.attrs)?;

        if roles.id {
            marked_id.push(field_ident);
        }
        if roles.tracker {
            marked_tracker.push(field_ident);
        }
        if field_ident == "id" {
            named_id = Some(field_ident);
        }
        if field_ident == "tracker" {
            named_tracker = Some(field_ident);
        }
    }

    let id = pick(marked_id, named_id, "id", input)?;
    let tracker = pick(marked_tracker, named_tracker, "tracker", input)?;

    let collection_name = container_collection(&input.attrs)?.map(|collection| {
        quote! {
            fn collection_name() -> &'static str {
                #collection
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::repolayer::entity::Entity for #ident #ty_generics #where_clause {
            fn id(&self) -> ::core::option::Option<&str> {
                ::core::option::Option::as_deref(&self.#id)
            }

            fn set_id(&mut self, id: ::std::string::String) {
                self.#id = ::core::option::Option::Some(id);
            }

            fn tracker(&self) -> ::repolayer::entity::TrackerState {
                self.#tracker
            }

            fn set_tracker(&mut self, state: ::repolayer::entity::TrackerState) {
                self.#tracker = state;
            }

            #collection_name
        }
    })
}
