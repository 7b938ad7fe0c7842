use anyhow::{anyhow, bail, Context, Result};
use wasmtime::{Engine, Instance, Linker, Module, Store, TypedFunc};

/// One instantiated WASM module. Exclusive while held by a caller; never
/// invoked concurrently. See the module-level WASM Worker contract: writes
/// `input` through the guest's `allocate` export, calls `handle_request`,
/// reads back the `(ptr, len)` result pair, then `deallocate`s both buffers.
pub struct Worker {
    store: Store<()>,
    allocate: TypedFunc<i32, i32>,
    deallocate: TypedFunc<(i32, i32), ()>,
    handle_request: TypedFunc<(i32, i32, i32, i32), i64>,
    memory: wasmtime::Memory,
    /// Set once the guest traps; a closed worker is never returned to the
    /// pool's idle queue.
    closed: bool,
}

impl Worker {
    /// Instantiate a fresh copy of `module`. `module` is compiled once per
    /// package and shared read-only across every worker instantiated from
    /// it; this call only builds a new `Instance`, not a new compilation.
    pub fn instantiate(engine: &Engine, module: &Module) -> Result<Self> {
        let mut linker: Linker<()> = Linker::new(engine);
        linker
            .define_unknown_imports_as_traps(module)
            .context("failed to stub guest imports")?;

        let mut store = Store::new(engine, ());
        let instance = linker
            .instantiate(&mut store, module)
            .context("failed to instantiate WASM module")?;

        if let Some(initialize) = instance.get_typed_func::<(), ()>(&mut store, "_initialize").ok()
        {
            initialize
                .call(&mut store, ())
                .context("guest `_initialize` trapped")?;
        }

        let allocate = get_export(&instance, &mut store, "allocate")?;
        let deallocate = get_export(&instance, &mut store, "deallocate")?;
        let handle_request = get_export(&instance, &mut store, "handle_request")?;
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| anyhow!("guest module does not export linear memory"))?;

        Ok(Worker {
            store,
            allocate,
            deallocate,
            handle_request,
            memory,
            closed: false,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Invoke `method` with `input`, the serialized request bytes. Never
    /// called concurrently on the same `Worker` — the pool enforces
    /// exclusivity by handing out at most one `&mut Worker` at a time.
    pub fn invoke(&mut self, method: &str, input: &[u8]) -> Result<Vec<u8>> {
        if self.closed {
            bail!("worker is closed after a previous trap");
        }

        let result = self.invoke_inner(method, input);
        if result.is_err() {
            // We don't distinguish a guest-level logic error (a thrown
            // exception the guest already encoded into its error path) from
            // an actual wasmtime trap here; both surface as `Err`. Only a
            // genuine trap — a `wasmtime::Trap` downcast succeeding — closes
            // the worker; anything else leaves it reusable.
            if let Err(ref e) = result {
                if e.downcast_ref::<wasmtime::Trap>().is_some() {
                    self.closed = true;
                }
            }
        }
        result
    }

    fn invoke_inner(&mut self, method: &str, input: &[u8]) -> Result<Vec<u8>> {
        let method_ptr = self.write_bytes(method.as_bytes())?;
        let input_ptr = self.write_bytes(input)?;

        let call_result = self.handle_request.call(
            &mut self.store,
            (
                method_ptr,
                method.len() as i32,
                input_ptr,
                input.len() as i32,
            ),
        );

        self.deallocate
            .call(&mut self.store, (method_ptr, method.len() as i32))
            .context("deallocate of method buffer failed")?;
        self.deallocate
            .call(&mut self.store, (input_ptr, input.len() as i32))
            .context("deallocate of input buffer failed")?;

        let packed = call_result.context("handle_request trapped")?;
        let (out_ptr, out_len) = unpack_result(packed);

        if out_len == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; out_len as usize];
        self.memory
            .read(&self.store, out_ptr as usize, &mut buf)
            .context("failed to read handle_request output from guest memory")?;

        self.deallocate
            .call(&mut self.store, (out_ptr, out_len))
            .context("deallocate of output buffer failed")?;

        Ok(buf)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<i32> {
        if bytes.is_empty() {
            return Ok(0);
        }
        let ptr = self
            .allocate
            .call(&mut self.store, bytes.len() as i32)
            .context("guest `allocate` trapped")?;
        self.memory
            .write(&mut self.store, ptr as usize, bytes)
            .context("failed to write into guest linear memory")?;
        Ok(ptr)
    }
}

fn get_export<Params, Results>(
    instance: &Instance,
    store: &mut Store<()>,
    name: &str,
) -> Result<TypedFunc<Params, Results>>
where
    Params: wasmtime::WasmParams,
    Results: wasmtime::WasmResults,
{
    instance
        .get_typed_func::<Params, Results>(store, name)
        .with_context(|| format!("guest module does not export `{name}` with the expected signature"))
}

/// `handle_request` packs its `(ptr, len)` result pair into a single i64, the
/// convention shared by the guest SDK builds: high 32 bits are the pointer,
/// low 32 bits are the length.
fn unpack_result(packed: i64) -> (i32, i32) {
    let ptr = (packed >> 32) as i32;
    let len = (packed & 0xFFFF_FFFF) as i32;
    (ptr, len)
}
