// These lints are triggered by darling's generated code for
// `#[darling(default)]`.
#![allow(clippy::option_if_let_else)]
#![allow(clippy::needless_continue)]

use darling::{FromDeriveInput, util::PathList};
use heck::{ToSnakeCase, ToUpperCamelCase};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{DeriveInput, Ident, Path, parse_macro_input};

#[allow(clippy::doc_markdown, reason = "false positive")]
/// Build a PascalCase enum variant name from a type path.
fn path_to_pascal_ident(path: &Path) -> Ident {
    let combined = path
        .segments
        .iter()
        .map(|s| s.ident.to_string())
        .collect::<Vec<_>>()
        .join("_");
    let pascal = combined.to_upper_camel_case();
    let span = path
        .segments
        .last()
        .map_or_else(proc_macro2::Span::call_site, |segment| segment.ident.span());
    Ident::new(&pascal, span)
}

/// Checks `<AggregateType>_<Name>_V<SchemaVersion>`.
fn validate_type_name(name: &str) -> Result<(), &'static str> {
    let segments: Vec<&str> = name.split('_').collect();
    let [aggregate_type, event_name, version] = segments.as_slice() else {
        return Err("expected exactly three `_`-separated segments");
    };
    if aggregate_type.is_empty() || event_name.is_empty() {
        return Err("aggregate type and name must not be empty");
    }
    let digits = version
        .strip_prefix('V')
        .or_else(|| version.strip_prefix('v'))
        .ok_or("version segment must start with `V`")?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err("version segment is not an integer");
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return Err("version segment must not have leading zeros");
    }
    match digits.parse::<u32>() {
        Ok(0) => Err("schema version must be positive"),
        Ok(_) => Ok(()),
        Err(_) => Err("version segment is not an integer"),
    }
}

/// Configuration for the `#[event(...)]` attribute.
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(event), supports(struct_any))]
struct EventArgs {
    ident: Ident,
    #[darling(default)]
    type_name: Option<String>,
    #[darling(default)]
    aggregate: Option<String>,
    #[darling(default)]
    version: Option<u32>,
}

impl EventArgs {
    /// Resolve the structural type name, or explain why it cannot be built.
    fn resolve_type_name(&self) -> Result<String, String> {
        let name = match (&self.type_name, &self.aggregate) {
            (Some(_), Some(_)) => {
                return Err("`type_name` cannot be combined with `aggregate`".to_owned());
            }
            (Some(_), None) if self.version.is_some() => {
                return Err("`type_name` cannot be combined with `version`".to_owned());
            }
            (Some(type_name), None) => type_name.clone(),
            (None, Some(aggregate)) => {
                format!("{aggregate}_{}_V{}", self.ident, self.version.unwrap_or(1))
            }
            (None, None) if self.version.is_some() => {
                return Err("`version` requires `aggregate`".to_owned());
            }
            (None, None) => self.ident.to_string(),
        };
        validate_type_name(&name)
            .map_err(|reason| format!("invalid event type name `{name}`: {reason}"))?;
        Ok(name)
    }
}

/// Configuration for the `#[aggregate(...)]` attribute.
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(aggregate), supports(struct_any))]
struct AggregateArgs {
    ident: Ident,
    vis: syn::Visibility,
    events: PathList,
    #[darling(default)]
    kind: Option<String>,
    #[darling(default)]
    schema_version: Option<u32>,
    #[darling(default)]
    event_enum: Option<String>,
    #[darling(default)]
    derives: Option<PathList>,
}

/// Captures the event type path and its generated enum variant identifier.
struct EventSpec<'a> {
    path: &'a Path,
    variant: Ident,
}

impl<'a> EventSpec<'a> {
    /// Build an event spec from a type path.
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            variant: path_to_pascal_ident(path),
        }
    }
}

/// Parse derive input with darling and render errors as tokens.
fn parse_or_error<T, F>(input: &DeriveInput, f: F) -> TokenStream2
where
    T: FromDeriveInput,
    F: FnOnce(T) -> TokenStream2,
{
    match T::from_derive_input(input) {
        Ok(args) => f(args),
        Err(err) => err.write_errors(),
    }
}

/// Derives `DomainEvent` for an event payload struct.
///
/// The structural type name must follow
/// `<AggregateType>_<Name>_V<SchemaVersion>` and is checked at compile time.
///
/// # Attributes
///
/// All optional, pick one form:
/// - none: the struct identifier is the type name, e.g. `Calculator_Added_V1`
/// - `type_name = "Calculator_Added_V1"`: explicit name
/// - `aggregate = "Calculator"` with optional `version = 2` (default 1): the
///   struct identifier becomes the name segment
///
/// # Example
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, DomainEvent)]
/// #[event(aggregate = "Calculator", version = 2)]
/// pub struct Added {
///     value: i64,
/// }
/// // Added::TYPE_NAME == "Calculator_Added_V2"
/// ```
#[proc_macro_derive(DomainEvent, attributes(event))]
pub fn derive_domain_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    derive_domain_event_impl(&input).into()
}

/// Internal entry point that returns tokens for the event derive.
fn derive_domain_event_impl(input: &DeriveInput) -> TokenStream2 {
    parse_or_error::<EventArgs, _>(input, |args| generate_domain_event_impl(&args, input))
}

/// Generate the event derive implementation tokens.
fn generate_domain_event_impl(args: &EventArgs, input: &DeriveInput) -> TokenStream2 {
    let type_name = match args.resolve_type_name() {
        Ok(type_name) => type_name,
        Err(message) => {
            return darling::Error::custom(message)
                .with_span(&input.ident)
                .write_errors();
        }
    };
    let struct_name = &args.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    quote! {
        impl #impl_generics ::keel::event::DomainEvent for #struct_name #ty_generics #where_clause {
            const TYPE_NAME: &'static str = #type_name;
        }
    }
}

/// Derives `AggregateState` for a struct.
///
/// This macro generates:
/// - An event enum containing all aggregate event types
/// - `From<E>` implementations for each event type
/// - `Serialize`, delegating to the wrapped payload
/// - `Payload` and `EventUnion` implementations so the enum can be encoded and
///   recovered from decoded payloads
/// - `AggregateState` implementation whose `reduce` dispatches to `Apply<E>`
///
/// The struct must implement `Default`.
///
/// # Attributes
///
/// ## Required
/// - `events(Type1, Type2, ...)` - Event types, each implementing
///   `DomainEvent`, `Clone`, `Serialize` and `Deserialize`
///
/// ## Optional
/// - `kind = "name"` - Aggregate type name (default: `snake_case` struct name)
/// - `schema_version = N` - State schema version (default: 1)
/// - `event_enum = "Name"` - Override generated event enum name (default:
///   `{Struct}Event`)
/// - `derives(Trait1, Trait2, ...)` - Additional derives for the generated
///   event enum. Always includes `Clone`. Common additions: `Debug`,
///   `PartialEq`, `Eq`
///
/// # Example
///
/// ```ignore
/// #[derive(Default, Serialize, Deserialize, AggregateState)]
/// #[aggregate(events(Added, Subtracted), schema_version = 2, derives(Debug, PartialEq))]
/// pub struct Calculator {
///     value: i64,
/// }
/// ```
#[proc_macro_derive(AggregateState, attributes(aggregate))]
pub fn derive_aggregate_state(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    derive_aggregate_state_impl(&input).into()
}

/// Internal entry point that returns tokens for the aggregate derive.
fn derive_aggregate_state_impl(input: &DeriveInput) -> TokenStream2 {
    parse_or_error::<AggregateArgs, _>(input, |args| generate_aggregate_state_impl(args, input))
}

/// Generate the aggregate derive implementation tokens.
#[allow(clippy::too_many_lines)]
fn generate_aggregate_state_impl(args: AggregateArgs, input: &DeriveInput) -> TokenStream2 {
    let event_specs: Vec<EventSpec<'_>> = args.events.iter().map(EventSpec::new).collect();

    if event_specs.is_empty() {
        return darling::Error::custom("events(...) must contain at least one event type")
            .with_span(&input.ident)
            .write_errors();
    }
    if args.schema_version == Some(0) {
        return darling::Error::custom("schema_version must be positive")
            .with_span(&input.ident)
            .write_errors();
    }

    let struct_name = &args.ident;
    let struct_vis = &args.vis;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let kind = args
        .kind
        .unwrap_or_else(|| struct_name.to_string().to_snake_case());
    let schema_version = args.schema_version.unwrap_or(1);

    let event_enum_name = args.event_enum.map_or_else(
        || Ident::new(&format!("{struct_name}Event"), struct_name.span()),
        |name| Ident::new(&name, struct_name.span()),
    );

    let event_types: Vec<&Path> = event_specs.iter().map(|spec| spec.path).collect();
    let variant_names: Vec<&Ident> = event_specs.iter().map(|spec| &spec.variant).collect();

    // Build derives list - always include Clone, add user-specified traits
    let user_derives = args.derives.unwrap_or_default();
    let derives = quote! { #[derive(Clone, #(#user_derives),*)] };

    quote! {
        #[doc = concat!("Event type for the [`", stringify!(#struct_name), "`] aggregate.")]
        #derives
        #struct_vis enum #event_enum_name {
            #(
                #[doc = concat!("[`", stringify!(#event_types), "`]")]
                #variant_names(#event_types)
            ),*
        }

        impl ::serde::Serialize for #event_enum_name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: ::serde::Serializer,
            {
                match self {
                    #(
                        Self::#variant_names(inner) => {
                            ::serde::Serialize::serialize(inner, serializer)
                        }
                    )*
                }
            }
        }

        impl ::keel::event::Payload for #event_enum_name {
            fn event_type(
                &self,
            ) -> Result<::keel::event::EventType, ::keel::event::InvalidEventTypeName> {
                match self {
                    #(Self::#variant_names(inner) => ::keel::event::Payload::event_type(inner)),*
                }
            }
        }

        impl ::keel::aggregate::EventUnion for #event_enum_name {
            const TYPE_NAMES: &'static [&'static str] =
                &[#(<#event_types as ::keel::event::DomainEvent>::TYPE_NAME),*];

            fn from_payload(
                payload: ::keel::registry::DecodedPayload,
            ) -> Result<Self, ::keel::registry::DecodedPayload> {
                #(
                    let payload = match payload.downcast::<#event_types>() {
                        Ok(inner) => return Ok(Self::#variant_names(*inner)),
                        Err(payload) => payload,
                    };
                )*
                Err(payload)
            }

            fn register<C: ::keel::codec::Codec>(
                builder: ::keel::registry::RegistryBuilder<C>,
            ) -> Result<::keel::registry::RegistryBuilder<C>, ::keel::registry::RegistryError> {
                #(let builder = builder.register::<#event_types>()?;)*
                Ok(builder)
            }
        }

        #(
            impl From<#event_types> for #event_enum_name {
                fn from(event: #event_types) -> Self {
                    Self::#variant_names(event)
                }
            }
        )*

        impl #impl_generics ::keel::aggregate::AggregateState
            for #struct_name #ty_generics #where_clause
        {
            const AGGREGATE_TYPE: &'static str = #kind;
            const SCHEMA_VERSION: u32 = #schema_version;
            type Event = #event_enum_name;

            fn reduce(mut self, event: &Self::Event) -> Self {
                match event {
                    #(
                        #event_enum_name::#variant_names(e) => {
                            ::keel::aggregate::Apply::apply(&mut self, e);
                        }
                    )*
                }
                self
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use syn::parse_quote;

    use super::*;

    /// Normalise token output by removing whitespace.
    fn compact(tokens: &TokenStream2) -> String {
        tokens
            .to_string()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    }

    #[test]
    fn type_name_validation_matches_runtime_rules() {
        assert!(validate_type_name("Calculator_Added_V1").is_ok());
        assert!(validate_type_name("calculator_added_v3").is_ok());
        assert!(validate_type_name("Calculator_Added").is_err());
        assert!(validate_type_name("Calculator_Value_Added_V1").is_err());
        assert!(validate_type_name("Calculator_Added_V0").is_err());
        assert!(validate_type_name("Calculator_Added_1").is_err());
        assert!(validate_type_name("_Added_V1").is_err());
        assert!(validate_type_name("Calculator_Added_V+1").is_err());
        assert!(validate_type_name("Calculator_Added_V007").is_err());
        assert!(validate_type_name("Calculator_Added_V10").is_ok());
    }

    #[test]
    fn domain_event_uses_struct_identifier() {
        let input: DeriveInput = parse_quote! {
            struct Calculator_Added_V1 {
                value: i64,
            }
        };

        let compact = compact(&derive_domain_event_impl(&input));

        assert!(compact.contains("impl::keel::event::DomainEventforCalculator_Added_V1"));
        assert!(compact.contains("constTYPE_NAME:&'staticstr=\"Calculator_Added_V1\""));
    }

    #[test]
    fn domain_event_builds_name_from_aggregate_and_version() {
        let input: DeriveInput = parse_quote! {
            #[event(aggregate = "Calculator", version = 2)]
            struct Added {
                value: i64,
            }
        };

        let compact = compact(&derive_domain_event_impl(&input));

        assert!(compact.contains("constTYPE_NAME:&'staticstr=\"Calculator_Added_V2\""));
    }

    #[test]
    fn domain_event_honours_explicit_type_name() {
        let input: DeriveInput = parse_quote! {
            #[event(type_name = "Account_Opened_V1")]
            struct AccountOpened;
        };

        let compact = compact(&derive_domain_event_impl(&input));

        assert!(compact.contains("constTYPE_NAME:&'staticstr=\"Account_Opened_V1\""));
    }

    #[test]
    fn domain_event_rejects_malformed_name() {
        let input: DeriveInput = parse_quote! {
            struct AccountOpened;
        };

        let compact = compact(&derive_domain_event_impl(&input));

        assert!(compact.contains("compile_error"));
        assert!(compact.contains("expectedexactlythree"));
    }

    #[test]
    fn domain_event_rejects_conflicting_attributes() {
        let input: DeriveInput = parse_quote! {
            #[event(type_name = "Account_Opened_V1", aggregate = "Account")]
            struct Opened;
        };

        let compact = compact(&derive_domain_event_impl(&input));

        assert!(compact.contains("`type_name`cannotbecombinedwith`aggregate`"));
    }

    #[test]
    fn aggregate_state_uses_defaults() {
        let input: DeriveInput = parse_quote! {
            #[aggregate(events(Added, Subtracted))]
            pub struct BankAccount {
                balance: i64,
            }
        };

        let compact = compact(&derive_aggregate_state_impl(&input));

        assert!(compact.contains("pubenumBankAccountEvent"));
        assert!(compact.contains("impl::keel::aggregate::AggregateStateforBankAccount"));
        assert!(compact.contains("constAGGREGATE_TYPE:&'staticstr=\"bank_account\""));
        assert!(compact.contains("constSCHEMA_VERSION:u32=1u32"));
        assert!(compact.contains("implFrom<Added>forBankAccountEvent"));
        assert!(compact.contains("payload.downcast::<Subtracted>()"));
        assert!(compact.contains("builder.register::<Added>()?"));
        assert!(compact.contains("::keel::aggregate::Apply::apply(&mutself,e)"));
    }

    #[test]
    fn aggregate_state_respects_overrides() {
        let input: DeriveInput = parse_quote! {
            #[aggregate(
                events(Added),
                kind = "calc",
                schema_version = 3,
                event_enum = "CalcEvent",
                derives(Debug, PartialEq)
            )]
            pub struct Calculator {
                value: i64,
            }
        };

        let compact = compact(&derive_aggregate_state_impl(&input));

        assert!(compact.contains("enumCalcEvent"));
        assert!(compact.contains("#[derive(Clone,Debug,PartialEq)]"));
        assert!(compact.contains("constAGGREGATE_TYPE:&'staticstr=\"calc\""));
        assert!(compact.contains("constSCHEMA_VERSION:u32=3u32"));
    }

    #[test]
    fn aggregate_state_emits_error_on_empty_events_list() {
        let input: DeriveInput = parse_quote! {
            #[aggregate(events())]
            pub struct Calculator;
        };

        let compact = compact(&derive_aggregate_state_impl(&input));

        assert!(compact.contains("events(...)mustcontainatleastoneeventtype"));
    }

    #[test]
    fn aggregate_state_rejects_zero_schema_version() {
        let input: DeriveInput = parse_quote! {
            #[aggregate(events(Added), schema_version = 0)]
            pub struct Calculator;
        };

        let compact = compact(&derive_aggregate_state_impl(&input));

        assert!(compact.contains("schema_versionmustbepositive"));
    }
}
