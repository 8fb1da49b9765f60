use std::net::IpAddr;

use async_trait::async_trait;
use dns_types::{DomainName, Query, RecordType, Response};
use netx_context::Context;
use netx_model::{ErrorWrapper, Failure, ResolveId};

use crate::{DnsTransport, Resolver};

/// Drives a [`DnsTransport`] to resolve a hostname: issues the A and AAAA queries in parallel,
/// retries each up to `retries` times but only on a timeout (§9: "retrying a refused or
/// malformed-response query just repeats the same failure"), and merges the two address lists
/// (§4.9).
pub struct QueryResolver<T> {
    transport: T,
    retries: u32,
}

impl<T: DnsTransport> QueryResolver<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retries: 3,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    async fn query_one(
        &self,
        ctx: &Context,
        resolve_id: ResolveId,
        domain: &DomainName,
        rtype: RecordType,
    ) -> Result<Vec<IpAddr>, ErrorWrapper> {
        let query = Query::new(domain.clone(), rtype);
        let mut last_error = None;

        for attempt in 0..=self.retries {
            match self.transport.round_trip(ctx.clone(), query.as_bytes()).await {
                Ok(bytes) => {
                    let response = Response::parse(&bytes).map_err(|e| {
                        ErrorWrapper::new(Failure::Unknown(e.to_string())).with_resolve_id(resolve_id)
                    })?;

                    if response.response_code() == dns_types::ResponseCode::NXDOMAIN {
                        return Err(ErrorWrapper::new(Failure::DnsNxdomainError).with_resolve_id(resolve_id));
                    }

                    return Ok(extract_addresses(&response));
                }
                Err(error) if error.failure == Failure::GenericTimeoutError && attempt < self.retries => {
                    tracing::debug!(%domain, attempt, "DNS query timed out, retrying");
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error.expect("loop only exits here after at least one timeout"))
    }
}

#[async_trait]
impl<T: DnsTransport> Resolver for QueryResolver<T> {
    async fn lookup_host(&self, ctx: Context, host: &str) -> Result<Vec<IpAddr>, ErrorWrapper> {
        // A `ResolverWrapper` wrapping this resolver already minted a resolve_id and attached it
        // to `ctx`; only mint one here when called directly (as the unit tests below do).
        let resolve_id = if ctx.resolve_id().is_none() {
            ResolveId::next()
        } else {
            ctx.resolve_id()
        };
        let ctx = ctx.with_resolve_id(resolve_id);

        let domain = DomainName::vec_from_str(host).map_err(|_| {
            ErrorWrapper::new(Failure::Unknown(format!("'{host}' is not a valid domain name")))
                .with_resolve_id(resolve_id)
        })?;

        let (a, aaaa) = tokio::join!(
            self.query_one(&ctx, resolve_id, &domain, RecordType::A),
            self.query_one(&ctx, resolve_id, &domain, RecordType::AAAA),
        );

        merge(a, aaaa, resolve_id)
    }

    fn network(&self) -> &'static str {
        self.transport.network()
    }

    fn address(&self) -> String {
        self.transport.address()
    }
}

/// Combines the A and AAAA results per §4.9 point 5: if the merged address list (whichever
/// queries succeeded, contributing zero addresses if they failed) is non-empty, that's success;
/// otherwise prefer the A query's error, then the AAAA query's error, then synthesize a
/// "no response" failure — this also covers the case where both queries succeeded but returned
/// zero records (e.g. two NOERROR replies), which is not success despite neither side erroring.
fn merge(
    a: Result<Vec<IpAddr>, ErrorWrapper>,
    aaaa: Result<Vec<IpAddr>, ErrorWrapper>,
    resolve_id: ResolveId,
) -> Result<Vec<IpAddr>, ErrorWrapper> {
    let a_error = a.clone().err();
    let aaaa_error = aaaa.clone().err();

    let mut merged = a.unwrap_or_default();
    merged.extend(aaaa.unwrap_or_default());

    if !merged.is_empty() {
        return Ok(merged);
    }

    Err(a_error
        .or(aaaa_error)
        .unwrap_or_else(|| {
            ErrorWrapper::new(Failure::Unknown("no response".to_owned())).with_resolve_id(resolve_id)
        }))
}

fn extract_addresses(response: &Response) -> Vec<IpAddr> {
    response
        .records()
        .filter_map(|record| match record.data() {
            dns_types::RecordData::A(a) => Some(IpAddr::V4(a.addr())),
            dns_types::RecordData::Aaaa(aaaa) => Some(IpAddr::V6(aaaa.addr())),
            _ => None,
        })
        .collect()
}
