
//! # frpc_macros
//!
//! `frpc_macros` derives the remote method whitelist of a target type, so no
//! dispatch branch has to be written by hand.

extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::{ Span, TokenStream as TokenStream2 };
use quote::{ format_ident, quote };
use syn::{ parse_macro_input, Error, FnArg, GenericArgument, Ident, ImplItem, ImplItemFn, ItemImpl, LitStr, Pat, PathArguments, ReturnType, Type };

use std::collections::HashSet;

/// Exposes the `&self` methods of an inherent impl block as remote methods.
///
/// Generates `enum <Type>Method` with one tag per exposed method, and an
/// implementation of `frpc::dispatch::RemoteCall` mapping each tag to its
/// method. Wire names are the lowerCamelCase method names.
///
/// Per-method options go in a `#[rpc(...)]` attribute:
///
/// - `#[rpc(name = "insertCSS")]` overrides the wire name;
/// - `#[rpc(skip)]` keeps the method out of the whitelist.
///
/// # Examples
/// ```ignore
/// struct Calc;
///
/// #[frpc::remote]
/// impl Calc {
///   fn add(&self, x: i32, y: i32) -> i32 {
///     x + y
///   }
///   fn div_rem(&self, x: i32, y: i32) -> (i32, i32) {
///     (x / y, x % y)
///   }
/// }
///
/// let reply = Calc.invoke(CalcMethod::DivRem, vec![7.into(), 2.into()]).unwrap();
/// ```
#[proc_macro_attribute]
pub fn remote(args: TokenStream, input: TokenStream) -> TokenStream {
  let mut ast = parse_macro_input!(input as ItemImpl);
  if !args.is_empty() {
    return Error::new(Span::call_site(), "`remote` takes no arguments")
      .to_compile_error()
      .into();
  }
  match expand(&mut ast) {
    Ok(tokens) => tokens.into(),
    Err(e) => e.to_compile_error().into(),
  }
}

struct Method {
  ident: Ident,
  variant: Ident,
  wire: String,
  args: Vec<(Ident, Type)>,
  output: Output,
}

enum Output {
  Unit,
  Pending,
  Value,
  Fallible(Box<Output>),
}

fn expand(ast: &mut ItemImpl) -> Result<TokenStream2, Error> {
  if ast.trait_.is_some() {
    return Err(Error::new_spanned(&ast.self_ty, "`remote` applies to inherent impl blocks"));
  }
  if !ast.generics.params.is_empty() {
    return Err(Error::new_spanned(&ast.generics, "generic targets are not supported"));
  }

  let service = match &*ast.self_ty {
    Type::Path(x) => match x.path.segments.last() {
      Some(segment) => segment.ident.clone(),
      None => return Err(Error::new_spanned(&ast.self_ty, "expected a type name")),
    },
    other => return Err(Error::new_spanned(other, "expected a type name")),
  };

  let mut methods = Vec::new();
  let mut seen = HashSet::new();
  for item in ast.items.iter_mut() {
    if let ImplItem::Fn(x) = item {
      if let Some(method) = method(x)? {
        if !seen.insert(method.wire.clone()) {
          return Err(Error::new_spanned(&x.sig.ident, format!("duplicate remote method name '{}'", method.wire)));
        }
        methods.push(method);
      }
    }
  }
  if methods.is_empty() {
    return Err(Error::new_spanned(&ast.self_ty, "no remote methods found"));
  }

  let self_ty = &ast.self_ty;
  let enum_code = format_ident!("{}Method", service);
  let variant_code: Vec<_> = methods.iter().map(|x| &x.variant).collect();
  let wire_code: Vec<_> = methods.iter().map(|x| LitStr::new(&x.wire, Span::call_site())).collect();
  let doc_code = format!("Remote methods exposed by [`{}`].", service);

  let match_branch_code = methods.iter().map(|x| {
    let method_name_code = &x.ident;
    let variant = &x.variant;
    let wire = LitStr::new(&x.wire, Span::call_site());
    let arg_name_code: Vec<_> = x.args.iter().map(|(name, _)| name).collect();

    let decode_code = if x.args.is_empty() {
      quote!(let _ = args;)
    } else {
      let decode = x.args.iter().enumerate().map(|(index, (name, ty))| {
        quote!(
          let #name: #ty = ::frpc::dispatch::decode_arg(#wire, #index, args.next())?;
        )
      });
      quote!(
        let mut args = args.into_iter();
        #(#decode)*
      )
    };

    let call_code = quote!(self.#method_name_code(#(#arg_name_code),*));
    let reply_code = reply(&x.output, call_code, &wire);

    quote!(
      #enum_code::#variant => {
        #decode_code
        #reply_code
      }
    )
  });

  Ok(quote!(

    #ast

    #[doc = #doc_code]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum #enum_code {
      #(#variant_code,)*
    }

    impl ::frpc::dispatch::MethodName for #enum_code {
      const ALL: &'static [Self] = &[#(Self::#variant_code),*];

      fn as_str(&self) -> &'static str {
        match self {
          #(Self::#variant_code => #wire_code,)*
        }
      }
    }

    impl ::core::fmt::Display for #enum_code {
      fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        f.write_str(::frpc::dispatch::MethodName::as_str(self))
      }
    }

    impl ::core::str::FromStr for #enum_code {
      type Err = ::frpc::Error;

      fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
        match s {
          #(#wire_code => ::core::result::Result::Ok(Self::#variant_code),)*
          _ => ::core::result::Result::Err(::frpc::Error::InvalidMethod(s.to_string())),
        }
      }
    }

    impl ::frpc::dispatch::RemoteCall for #self_ty {
      type Method = #enum_code;

      fn invoke(
        &self,
        method: Self::Method,
        args: ::std::vec::Vec<::frpc::__private::Value>,
      ) -> ::core::result::Result<::frpc::pending::Reply, ::frpc::Error> {
        match method {
          #(#match_branch_code)*
        }
      }
    }

  ))
}

/// Reads one impl item; `None` when it is not exposed.
fn method(x: &mut ImplItemFn) -> Result<Option<Method>, Error> {
  let mut skip = false;
  let mut name = None;
  for attr in x.attrs.iter().filter(|attr| attr.path().is_ident("rpc")) {
    attr.parse_nested_meta(|meta| {
      if meta.path.is_ident("skip") {
        skip = true;
        Ok(())
      } else if meta.path.is_ident("name") {
        let value: LitStr = meta.value()?.parse()?;
        name = Some(value.value());
        Ok(())
      } else {
        Err(meta.error("expected `skip` or `name = \"...\"`"))
      }
    })?;
  }
  x.attrs.retain(|attr| !attr.path().is_ident("rpc"));

  if skip {
    return Ok(None);
  }
  let receiver = match x.sig.receiver() {
    Some(receiver) => receiver,
    None => return Ok(None),
  };
  if receiver.reference.is_none() || receiver.mutability.is_some() {
    return Err(Error::new_spanned(receiver, "remote methods must take `&self`"));
  }
  if let Some(asyncness) = &x.sig.asyncness {
    return Err(Error::new_spanned(asyncness, "remote methods return `Pending` instead of being async"));
  }
  if !x.sig.generics.params.is_empty() {
    return Err(Error::new_spanned(&x.sig.generics, "remote methods cannot be generic"));
  }

  let rust_name = x.sig.ident.to_string();
  let rust_name = rust_name.trim_start_matches("r#");

  let args = x.sig.inputs.iter().skip(1).enumerate().map(|(index, x)| {
    if let FnArg::Typed(x) = x {
      let arg_name_code = match &*x.pat {
        Pat::Ident(x) => format_ident!("__{}", x.ident),
        _ => format_ident!("__arg{}", index),
      };
      Ok((arg_name_code, (*x.ty).clone()))
    } else {
      Err(Error::new_spanned(x, "unexpected receiver"))
    }
  }).collect::<Result<Vec<_>, _>>()?;

  let output = match &x.sig.output {
    ReturnType::Default => Output::Unit,
    ReturnType::Type(_, ty) => classify(ty),
  };

  Ok(Some(Method {
    ident: x.sig.ident.clone(),
    variant: format_ident!("{}", pascal_case(rust_name)),
    wire: name.unwrap_or_else(|| camel_case(rust_name)),
    args,
    output,
  }))
}

fn classify(ty: &Type) -> Output {
  match ty {
    Type::Tuple(x) if x.elems.is_empty() => Output::Unit,
    Type::Paren(x) => classify(&x.elem),
    Type::Path(x) => {
      let segment = match x.path.segments.last() {
        Some(segment) => segment,
        None => return Output::Value,
      };
      if segment.ident == "Pending" {
        return Output::Pending;
      }
      if segment.ident == "Result" {
        if let PathArguments::AngleBracketed(generics) = &segment.arguments {
          if let Some(GenericArgument::Type(ok)) = generics.args.first() {
            return Output::Fallible(Box::new(classify(ok)));
          }
        }
      }
      Output::Value
    }
    _ => Output::Value,
  }
}

fn reply(output: &Output, value: TokenStream2, wire: &LitStr) -> TokenStream2 {
  match output {
    Output::Unit => quote!({
      let _ = #value;
      ::core::result::Result::Ok(::frpc::pending::Reply::Ready(::frpc::__private::Value::Null))
    }),
    Output::Pending => quote!(
      ::core::result::Result::Ok(::frpc::pending::Reply::Pending(#value))
    ),
    Output::Value => quote!(
      ::frpc::pending::Reply::encode(#wire, #value)
    ),
    Output::Fallible(ok) => {
      let ok_code = reply(ok, quote!(value), wire);
      quote!(
        match #value {
          ::core::result::Result::Ok(value) => #ok_code,
          ::core::result::Result::Err(e) => ::core::result::Result::Err(::frpc::Error::raised(e)),
        }
      )
    }
  }
}

fn camel_case(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  for (i, part) in name.split('_').filter(|part| !part.is_empty()).enumerate() {
    if i == 0 {
      out.push_str(part);
    } else {
      capitalize_into(part, &mut out);
    }
  }
  out
}

fn pascal_case(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  for part in name.split('_').filter(|part| !part.is_empty()) {
    capitalize_into(part, &mut out);
  }
  out
}

fn capitalize_into(part: &str, out: &mut String) {
  let mut chars = part.chars();
  if let Some(first) = chars.next() {
    out.extend(first.to_uppercase());
    out.push_str(chars.as_str());
  }
}
