//! `#[derive(StorageEncode, StorageDecode)]` for the Field/Block binary
//! codec (§3 "a pair of serializers (binary and text)") and for Keeper
//! payloads and Raft log entries, which all round-trip through
//! `crucible_encoding::{StorageEncode, StorageDecode}`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

#[proc_macro_derive(StorageEncode)]
pub fn derive_storage_encode(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let fields = struct_fields(&input.data, name);

    let encode_fields = fields.iter().map(|f| {
        quote! { crucible_encoding::StorageEncode::encode(&self.#f, buf); }
    });

    let expanded = quote! {
        impl crucible_encoding::StorageEncode for #name {
            fn encode(&self, buf: &mut ::bytes::BytesMut) {
                #(#encode_fields)*
            }
        }
    };
    expanded.into()
}

#[proc_macro_derive(StorageDecode)]
pub fn derive_storage_decode(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let fields = struct_fields(&input.data, name);

    let decode_fields = fields.iter().map(|f| {
        quote! { #f: crucible_encoding::StorageDecode::decode(buf)?, }
    });

    let expanded = quote! {
        impl crucible_encoding::StorageDecode for #name {
            fn decode(buf: &mut ::bytes::Bytes) -> ::std::result::Result<Self, crucible_encoding::DecodeError> {
                Ok(Self {
                    #(#decode_fields)*
                })
            }
        }
    };
    expanded.into()
}

fn struct_fields(data: &Data, name: &syn::Ident) -> Vec<syn::Ident> {
    match data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields
                .named
                .iter()
                .map(|f| f.ident.clone().expect("named field"))
                .collect(),
            _ => panic!("StorageEncode/StorageDecode only support structs with named fields"),
        },
        _ => panic!(
            "StorageEncode/StorageDecode only support structs, not {}",
            name
        ),
    }
}
